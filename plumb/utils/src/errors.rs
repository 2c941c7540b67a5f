//! Errors generated by the router.

/// Convenience wrapper to represent success or a meaningful router error.
pub type PlumbResult<T> = std::result::Result<T, Error>;

/// Errors generated while parsing, routing, or flushing operations.
#[derive(Clone)]
pub struct Error {
    kind: Box<ErrorKind>,
    pos: Option<(usize, usize)>,
    post_msg: Option<String>,
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.pos {
            Some((line, col)) => write!(f, "{}:{}: {}", line, col, self.kind)?,
            None => write!(f, "{}", self.kind)?,
        }
        if let Some(post) = &self.post_msg {
            write!(f, "\n{}", post)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

impl std::error::Error for Error {}

impl Error {
    fn new(kind: ErrorKind) -> Self {
        Self {
            kind: Box::new(kind),
            pos: None,
            post_msg: None,
        }
    }

    pub fn with_pos(mut self, line: usize, col: usize) -> Self {
        self.pos = Some((line, col));
        self
    }

    pub fn with_post_msg(mut self, msg: Option<String>) -> Self {
        self.post_msg = msg;
        self
    }

    pub fn parse_error<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::Parse).with_post_msg(Some(msg.to_string()))
    }

    pub fn semantic<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::Semantic(msg.to_string()))
    }

    pub fn runtime<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::Runtime(msg.to_string()))
    }

    pub fn scheduler<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::Scheduler(msg.to_string()))
    }

    pub fn invalid_file<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::InvalidFile(msg.to_string()))
    }

    pub fn write_error<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::WriteError(msg.to_string()))
    }

    pub fn misc<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::Misc(msg.to_string()))
    }

    pub fn location(&self) -> Option<(usize, usize)> {
        self.pos
    }

    pub fn message(&self) -> String {
        self.kind.to_string()
    }
}

/// Standard error type for router errors.
#[derive(Clone)]
enum ErrorKind {
    /// The rule file is not recognized by the grammar.
    Parse,
    /// The rule file parsed but references something that does not exist.
    Semantic(String),
    /// Condition evaluation or action execution failed for one routable.
    Runtime(String),
    /// The operation graph is inconsistent at flush time.
    Scheduler(String),
    /// The input file is invalid (does not exist).
    InvalidFile(String),
    /// Failed to write the output.
    WriteError(String),
    /// Miscellaneous error message.
    Misc(String),
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use ErrorKind::*;
        match self {
            Parse => {
                write!(f, "Parse error")
            }
            Semantic(msg) => {
                write!(f, "Semantic error: {msg}")
            }
            Runtime(msg) => {
                write!(f, "Runtime error: {msg}")
            }
            Scheduler(msg) => {
                write!(f, "Scheduler error: {msg}")
            }
            InvalidFile(msg) | WriteError(msg) | Misc(msg) => {
                write!(f, "{msg}")
            }
        }
    }
}

// Conversions from other error types to our error type so that
// we can use `?` in all the places.
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::write_error(format!("IO Error: {}", e))
    }
}
