use std::fmt::Display;
use std::path::Path;

/// Helper to format a path for error messages and status lines.
/// UTF-8 paths are shell quoted only when necessary; anything else
/// falls back to the debug representation.
#[derive(Debug)]
pub struct PathQuotedDisplay<'a> {
    path: &'a Path,
}

impl<'a> PathQuotedDisplay<'a> {
    /// Wrap a path for display.
    pub fn new<P: AsRef<Path> + ?Sized>(path: &'a P) -> Self {
        Self {
            path: path.as_ref(),
        }
    }
}

impl Display for PathQuotedDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(s) = self.path.to_str() {
            if let Ok(quoted) = shlex::try_quote(s) {
                return f.write_str(&quoted);
            }
        }
        write!(f, "{:?}", self.path)
    }
}
