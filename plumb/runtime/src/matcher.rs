//! Predicate evaluation: glob and regex matching, stat lookups, and the
//! streaming multi-pattern content scanner.
//!
//! Several `grep` sites may test the same file during one session. Each
//! file is opened at most once: the first scan drives a matcher for every
//! still-undecided constant-pattern site, and suspends mid-stream (keeping
//! the reader) as soon as the asking site has its answer while others are
//! still live. A later check for the same path resumes where the reader
//! left off. Dynamic patterns run a private matcher alongside the shared
//! scan.
use crate::routable::Value;
use plumb_utils::{Error, PlumbResult};
use regex::bytes::Regex as BytesRegex;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use plumb_frontend::ast::{ByteRange, FileType, SiteSpec};

/// Match `pattern` against the whole subject, shell-wildcard style,
/// case-sensitively.
pub fn glob_match(pattern: &str, subject: &str) -> PlumbResult<bool> {
    let pattern = glob::Pattern::new(pattern).map_err(|e| {
        Error::runtime(format!("invalid glob pattern `{pattern}`: {e}"))
    })?;
    Ok(pattern.matches(subject))
}

/// Match `pattern` at the start of `subject`. On success, return the
/// variable bindings to store: `0` for the whole match, positional groups
/// by number, then named groups. Unmatched optional groups bind nil.
pub fn regex_captures(
    pattern: &str,
    subject: &str,
) -> PlumbResult<Option<Vec<(String, Value)>>> {
    let re = regex::Regex::new(&format!(r"\A(?:{pattern})")).map_err(|e| {
        Error::runtime(format!("invalid match pattern `{pattern}`: {e}"))
    })?;
    let Some(caps) = re.captures(subject) else {
        return Ok(None);
    };
    fn group(m: Option<regex::Match<'_>>) -> Value {
        m.map_or(Value::Nil, |m| Value::Str(m.as_str().to_string()))
    }
    let mut bindings = vec![("0".to_string(), group(caps.get(0)))];
    for i in 1..caps.len() {
        bindings.push((i.to_string(), group(caps.get(i))));
    }
    for name in re.capture_names().flatten() {
        bindings.push((name.to_string(), group(caps.name(name))));
    }
    Ok(Some(bindings))
}

/// Session-scoped stat results. Failures are memoized too and answer false.
#[derive(Debug, Default)]
pub struct StatCache {
    cache: HashMap<PathBuf, Option<fs::Metadata>>,
}

impl StatCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_type_matches(&mut self, path: &Path, want: FileType) -> bool {
        let meta = self
            .cache
            .entry(path.to_path_buf())
            .or_insert_with(|| fs::metadata(path).ok());
        match meta {
            Some(meta) => type_matches(meta.file_type(), want),
            None => false,
        }
    }
}

fn type_matches(ty: fs::FileType, want: FileType) -> bool {
    #[cfg(unix)]
    use std::os::unix::fs::FileTypeExt;
    match want {
        FileType::Dir => ty.is_dir(),
        FileType::File => ty.is_file(),
        #[cfg(unix)]
        FileType::CharDev => ty.is_char_device(),
        #[cfg(unix)]
        FileType::BlockDev => ty.is_block_device(),
        #[cfg(unix)]
        FileType::Fifo => ty.is_fifo(),
        #[cfg(unix)]
        FileType::Sock => ty.is_socket(),
        // door, port and whiteout nodes exist only on platforms std does
        // not expose; stat never reports them here.
        _ => false,
    }
}

/// Matcher state for one grep site over one file: the compiled pattern, the
/// byte window, and how many bytes it has consumed.
struct SiteMatcher {
    regex: BytesRegex,
    range: ByteRange,
    seen: u64,
}

impl SiteMatcher {
    fn new(regex: BytesRegex, range: ByteRange) -> Self {
        Self {
            regex,
            range,
            seen: 0,
        }
    }

    /// Feed one newline-delimited chunk. Reports whether the pattern hit in
    /// this chunk and whether the byte window is now exhausted. Bytes below
    /// `low` are skipped (slicing into the chunk when the window starts
    /// mid-chunk); no bytes at or past `high` are ever searched.
    fn feed(&mut self, chunk: &[u8]) -> (bool, bool) {
        let start = self.seen;
        self.seen += chunk.len() as u64;
        let done = self.range.high.is_some_and(|high| self.seen >= high);
        if self.range.high.is_some_and(|high| start >= high) {
            return (false, true);
        }
        let mut lo = 0usize;
        if let Some(low) = self.range.low {
            if self.seen <= low {
                // The whole chunk is below the window.
                return (false, done);
            }
            if start < low {
                lo = (low - start) as usize;
            }
        }
        let mut hi = chunk.len();
        if let Some(high) = self.range.high {
            let visible = (high - start) as usize;
            if visible < hi {
                hi = visible;
            }
        }
        let hit = lo < hi && self.regex.is_match(&chunk[lo..hi]);
        (hit, done)
    }
}

/// A suspended read: the open reader plus every site still waiting on
/// bytes from this file.
struct Scan {
    reader: BufReader<File>,
    live: Vec<(usize, SiteMatcher)>,
}

/// The streaming grep engine: per-(site, path) result cache, the
/// resumable-read table, and an open counter per path.
///
/// Results are final: once `(site, path)` is decided, later checks return
/// the cached answer without touching the file.
#[derive(Default)]
pub struct GrepEngine {
    cache: HashMap<(usize, PathBuf), bool>,
    scans: HashMap<PathBuf, Scan>,
    opens: HashMap<PathBuf, usize>,
}

impl GrepEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `path` has been opened this session.
    pub fn open_count(&self, path: &Path) -> usize {
        self.opens.get(path).copied().unwrap_or(0)
    }

    /// Answer whether `pattern` occurs in `path` for the given site.
    ///
    /// An unreadable path answers false. Read failures mid-stream are
    /// runtime errors.
    pub fn check(
        &mut self,
        site: usize,
        path: &Path,
        pattern: &str,
        range: ByteRange,
        sites: &[SiteSpec],
    ) -> PlumbResult<bool> {
        let key = (site, path.to_path_buf());
        if let Some(&decided) = self.cache.get(&key) {
            return Ok(decided);
        }

        // Constant patterns are covered by the shared scan; dynamic
        // patterns get a private matcher.
        let mut private = if sites[site].constant.is_none() {
            Some(SiteMatcher::new(compile(pattern)?, range))
        } else {
            None
        };

        let mut scan = match self.scans.remove(path) {
            Some(scan) => scan,
            None => match self.open_scan(path, sites)? {
                Some(scan) => scan,
                None => return Ok(false),
            },
        };

        let mut line = Vec::new();
        loop {
            line.clear();
            let n = scan
                .reader
                .read_until(b'\n', &mut line)
                .map_err(|e| {
                    Error::runtime(format!(
                        "read error on {}: {e}",
                        path.display()
                    ))
                })?;
            if n == 0 {
                // End of file: everything still undecided is a miss.
                if private.is_some() {
                    self.cache.insert(key.clone(), false);
                }
                for (idx, _) in scan.live.drain(..) {
                    self.cache.entry((idx, path.to_path_buf())).or_insert(false);
                }
                break;
            }

            if let Some(matcher) = private.as_mut() {
                let (hit, done) = matcher.feed(&line);
                if hit || done {
                    self.cache.insert(key.clone(), hit);
                    private = None;
                }
            }

            let mut i = 0;
            while i < scan.live.len() {
                let (idx, matcher) = &mut scan.live[i];
                let (hit, done) = matcher.feed(&line);
                if hit || done {
                    let idx = *idx;
                    scan.live.swap_remove(i);
                    self.cache.insert((idx, path.to_path_buf()), hit);
                } else {
                    i += 1;
                }
            }

            if self.cache.contains_key(&key) {
                // Our answer is known. Park the reader if other sites still
                // want bytes, otherwise let it close.
                if !scan.live.is_empty() {
                    self.scans.insert(path.to_path_buf(), scan);
                }
                break;
            }
        }
        Ok(self.cache.get(&key).copied().unwrap_or(false))
    }

    /// Open `path` and seed matchers for every constant-pattern site that
    /// has no verdict for it yet. Unreadable paths yield `None`.
    fn open_scan(
        &mut self,
        path: &Path,
        sites: &[SiteSpec],
    ) -> PlumbResult<Option<Scan>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                log::debug!("cannot read {}: {e}", path.display());
                return Ok(None);
            }
        };
        *self.opens.entry(path.to_path_buf()).or_insert(0) += 1;
        log::debug!("open {}", path.display());
        let mut live = Vec::new();
        for (idx, spec) in sites.iter().enumerate() {
            if let Some(pattern) = &spec.constant {
                if !self.cache.contains_key(&(idx, path.to_path_buf())) {
                    live.push((
                        idx,
                        SiteMatcher::new(compile(pattern)?, spec.range),
                    ));
                }
            }
        }
        Ok(Some(Scan {
            reader: BufReader::new(file),
            live,
        }))
    }

    /// Session teardown: drop every parked reader and record a miss for
    /// any site still waiting on its in-flight path.
    pub fn finish(&mut self) {
        let scans: Vec<(PathBuf, Scan)> = self.scans.drain().collect();
        for (path, scan) in scans {
            for (idx, _) in scan.live {
                self.cache.entry((idx, path.clone())).or_insert(false);
            }
        }
    }
}

fn compile(pattern: &str) -> PlumbResult<BytesRegex> {
    BytesRegex::new(pattern).map_err(|e| {
        Error::runtime(format!("invalid grep pattern `{pattern}`: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn matcher(pattern: &str, range: ByteRange) -> SiteMatcher {
        SiteMatcher::new(BytesRegex::new(pattern).unwrap(), range)
    }

    #[test]
    fn unbounded_matcher_never_reports_done() {
        let mut m = matcher("beta", ByteRange::default());
        assert_eq!(m.feed(b"alpha\n"), (false, false));
        assert_eq!(m.feed(b"beta\n"), (true, false));
    }

    #[test]
    fn high_bound_stops_the_search() {
        // window is [0, 4): the pattern begins at offset 4 and must not hit
        let mut m = matcher(
            "beta",
            ByteRange {
                low: None,
                high: Some(4),
            },
        );
        let (hit, done) = m.feed(b"abc\nbeta\n");
        assert!(!hit);
        assert!(done);
    }

    #[test]
    fn low_bound_skips_leading_bytes() {
        let mut m = matcher(
            "alpha",
            ByteRange {
                low: Some(6),
                high: None,
            },
        );
        // "alpha\n" occupies [0, 6) and is entirely below the window
        assert_eq!(m.feed(b"alpha\n"), (false, false));
        assert_eq!(m.feed(b"alpha\n"), (true, false));
    }

    #[test]
    fn low_bound_slices_mid_chunk() {
        let mut m = matcher(
            "ab",
            ByteRange {
                low: Some(3),
                high: None,
            },
        );
        // bytes 0..3 are masked, so the first "ab" cannot match
        let (hit, _) = m.feed(b"ab.ab\n");
        assert!(hit);
        let mut m = matcher(
            "ab",
            ByteRange {
                low: Some(3),
                high: None,
            },
        );
        let (hit, _) = m.feed(b"ab....\n");
        assert!(!hit);
    }

    #[test]
    fn empty_window_is_false_without_matching() {
        let mut m = matcher(
            ".*",
            ByteRange {
                low: Some(10),
                high: Some(5),
            },
        );
        let (hit, done) = m.feed(b"anything\n");
        assert!(!hit);
        assert!(done);
    }

    fn fixture(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file.flush().unwrap();
        file
    }

    fn constant_sites(patterns: &[&str]) -> Vec<SiteSpec> {
        patterns
            .iter()
            .map(|p| SiteSpec {
                constant: Some((*p).to_string()),
                range: ByteRange::default(),
            })
            .collect()
    }

    #[test]
    fn coalesced_scan_opens_the_file_once() {
        let file = fixture(&[
            "one", "two", "alpha", "four", "five", "six", "beta",
        ]);
        let sites = constant_sites(&["alpha", "beta", "alpha"]);
        let mut engine = GrepEngine::new();

        // First check decides at line 3 and parks the reader for the rest.
        assert!(engine
            .check(0, file.path(), "alpha", ByteRange::default(), &sites)
            .unwrap());
        assert_eq!(engine.open_count(file.path()), 1);
        assert!(engine.scans.contains_key(file.path()));

        // Second pattern resumes the same reader from line 4.
        assert!(engine
            .check(1, file.path(), "beta", ByteRange::default(), &sites)
            .unwrap());
        assert_eq!(engine.open_count(file.path()), 1);

        // The duplicate pattern was decided during the first scan.
        assert!(engine
            .check(2, file.path(), "alpha", ByteRange::default(), &sites)
            .unwrap());
        assert_eq!(engine.open_count(file.path()), 1);
    }

    #[test]
    fn eof_records_misses_and_retires_the_scan() {
        let file = fixture(&["nothing", "here"]);
        let sites = constant_sites(&["absent", "alsoabsent"]);
        let mut engine = GrepEngine::new();
        assert!(!engine
            .check(0, file.path(), "absent", ByteRange::default(), &sites)
            .unwrap());
        assert!(!engine.scans.contains_key(file.path()));
        // The sibling site was falsed out by the same read.
        assert!(!engine
            .check(1, file.path(), "alsoabsent", ByteRange::default(), &sites)
            .unwrap());
        assert_eq!(engine.open_count(file.path()), 1);
    }

    #[test]
    fn cached_results_are_final() {
        let file = fixture(&["alpha"]);
        let sites = constant_sites(&["alpha"]);
        let mut engine = GrepEngine::new();
        assert!(engine
            .check(0, file.path(), "alpha", ByteRange::default(), &sites)
            .unwrap());
        // Delete the file: the cached verdict must answer without I/O.
        let path = file.path().to_path_buf();
        drop(file);
        assert!(engine
            .check(0, &path, "alpha", ByteRange::default(), &sites)
            .unwrap());
    }

    #[test]
    fn dynamic_pattern_rides_a_private_matcher() {
        let file = fixture(&["alpha", "beta"]);
        // site 0 is dynamic (no constant); site 1 is constant
        let sites = vec![
            SiteSpec {
                constant: None,
                range: ByteRange::default(),
            },
            SiteSpec {
                constant: Some("beta".to_string()),
                range: ByteRange::default(),
            },
        ];
        let mut engine = GrepEngine::new();
        assert!(engine
            .check(0, file.path(), "alpha", ByteRange::default(), &sites)
            .unwrap());
        assert!(engine
            .check(1, file.path(), "beta", ByteRange::default(), &sites)
            .unwrap());
        assert_eq!(engine.open_count(file.path()), 1);
    }

    #[test]
    fn unreadable_path_answers_false() {
        let mut engine = GrepEngine::new();
        let sites = constant_sites(&["x"]);
        assert!(!engine
            .check(
                0,
                Path::new("/no/such/file/exists"),
                "x",
                ByteRange::default(),
                &sites
            )
            .unwrap());
    }

    #[test]
    fn teardown_falses_out_inflight_sites() {
        let file = fixture(&["alpha", "filler", "more"]);
        let sites = constant_sites(&["alpha", "neverfound"]);
        let mut engine = GrepEngine::new();
        assert!(engine
            .check(0, file.path(), "alpha", ByteRange::default(), &sites)
            .unwrap());
        assert!(engine.scans.contains_key(file.path()));
        engine.finish();
        assert!(engine.scans.is_empty());
        assert_eq!(
            engine.cache.get(&(1, file.path().to_path_buf())),
            Some(&false)
        );
    }

    #[test]
    fn stat_cache_answers_file_types() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("f");
        std::fs::write(&file_path, b"x").unwrap();
        let mut stats = StatCache::new();
        assert!(stats.file_type_matches(&file_path, FileType::File));
        assert!(!stats.file_type_matches(&file_path, FileType::Dir));
        assert!(stats.file_type_matches(dir.path(), FileType::Dir));
        assert!(!stats.file_type_matches(Path::new("/no/such"), FileType::File));
    }

    #[test]
    fn regex_captures_anchor_and_bind_groups() {
        let bound = regex_captures("(?P<stem>[a-z]+)\\.(rs)", "main.rs extra")
            .unwrap()
            .unwrap();
        assert!(bound.contains(&("0".to_string(), Value::Str("main.rs".into()))));
        assert!(bound.contains(&("1".to_string(), Value::Str("main".into()))));
        assert!(bound.contains(&("stem".to_string(), Value::Str("main".into()))));
        // not anchored at the start -> no match
        assert!(regex_captures("rs", "main.rs").unwrap().is_none());
    }

    #[test]
    fn glob_match_is_full_and_case_sensitive() {
        assert!(glob_match("*.py", "a.py").unwrap());
        assert!(!glob_match("*.py", "a.PY").unwrap());
        assert!(!glob_match("*.py", "a.py.bak").unwrap());
    }
}
