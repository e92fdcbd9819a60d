use std::fmt;
use std::panic::Location;

/// A snapshot of the call site an event was created at.
///
/// Captured with `#[track_caller]`, so as long as every public entry point
/// up the stack is annotated, the recorded location is the user-visible
/// call site rather than library internals. Equality is file + line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Caller {
    file: &'static str,
    line: u32,
}

impl Caller {
    /// Capture the caller of the annotated frame.
    #[track_caller]
    pub fn capture() -> Self {
        let loc = Location::caller();
        Self {
            file: loc.file(),
            line: loc.line(),
        }
    }

    pub const fn new(file: &'static str, line: u32) -> Self {
        Self { file, line }
    }

    /// The all-zero caller, returned when capture is unavailable.
    pub const fn zero() -> Self {
        Self { file: "", line: 0 }
    }

    pub fn is_zero(&self) -> bool {
        self.file.is_empty() && self.line == 0
    }

    pub fn file(&self) -> &'static str {
        self.file
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    /// The last three path segments of the file.
    pub fn short_file(&self) -> String {
        let segments: Vec<&str> = self.file.split(['/', '\\']).collect();
        let start = segments.len().saturating_sub(3);
        segments[start..].join("/")
    }

    /// `file:line`, with the shortened file form.
    pub fn label(&self) -> String {
        format!("{}:{}", self.short_file(), self.line)
    }

    /// Cache-key form: every character outside `[A-Za-z0-9.-]` replaced by
    /// `_`, suffixed with `_<line>`.
    pub fn key(&self) -> String {
        let mut out: String = self
            .short_file()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        out.push('_');
        out.push_str(&self.line.to_string());
        out
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            f.write_str("<unknown>")
        } else {
            write!(f, "{}:{}", self.short_file(), self.line)
        }
    }
}
