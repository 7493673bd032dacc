//! Runtime faults raised inside the interpreter.

use std::fmt;

/// Exception kinds the interpreter knows, with their parent in the hierarchy.
pub const EXCEPTION_KINDS: &[(&str, &str)] = &[
    ("BaseException", ""),
    ("Exception", "BaseException"),
    ("ArithmeticError", "Exception"),
    ("ZeroDivisionError", "ArithmeticError"),
    ("OverflowError", "ArithmeticError"),
    ("LookupError", "Exception"),
    ("KeyError", "LookupError"),
    ("IndexError", "LookupError"),
    ("NameError", "Exception"),
    ("TypeError", "Exception"),
    ("ValueError", "Exception"),
    ("AttributeError", "Exception"),
    ("ImportError", "Exception"),
    ("ModuleNotFoundError", "ImportError"),
    ("RuntimeError", "Exception"),
    ("NotImplementedError", "RuntimeError"),
    ("RecursionError", "RuntimeError"),
    ("AssertionError", "Exception"),
    ("MemoryError", "Exception"),
    ("StopIteration", "Exception"),
    ("OSError", "Exception"),
    ("FileNotFoundError", "OSError"),
    ("PermissionError", "OSError"),
];

/// Largest string or sequence a single operation may build, in items.
pub const MAX_ALLOC_ITEMS: usize = 10_000_000;

/// Whether `kind` is `ancestor` or inherits from it.
pub fn is_subclass(kind: &str, ancestor: &str) -> bool {
    let mut current = kind;
    loop {
        if current == ancestor {
            return true;
        }
        match EXCEPTION_KINDS.iter().find(|(k, _)| *k == current) {
            Some((_, parent)) if !parent.is_empty() => current = parent,
            _ => return false,
        }
    }
}

pub fn is_exception_kind(name: &str) -> bool {
    EXCEPTION_KINDS.iter().any(|(k, _)| *k == name)
}

/// A raised exception, or an unrecoverable interpreter stop.
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    pub kind: String,
    pub message: String,
    pub line: Option<usize>,
    /// Fatal faults bypass `except` clauses.
    pub fatal: bool,
}

impl Fault {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            line: None,
            fatal: false,
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new("TypeError", message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new("ValueError", message)
    }

    pub fn key_error(message: impl Into<String>) -> Self {
        Self::new("KeyError", message)
    }

    pub fn index_error(message: impl Into<String>) -> Self {
        Self::new("IndexError", message)
    }

    pub fn attribute_error(message: impl Into<String>) -> Self {
        Self::new("AttributeError", message)
    }

    pub fn name_error(name: &str) -> Self {
        Self::new("NameError", format!("name '{}' is not defined", name))
    }

    pub fn zero_division(message: impl Into<String>) -> Self {
        Self::new("ZeroDivisionError", message)
    }

    pub fn memory_error(message: impl Into<String>) -> Self {
        Self::new("MemoryError", message)
    }

    pub fn syntax(message: impl Into<String>, line: usize) -> Self {
        let mut fault = Self::new("SyntaxError", message);
        fault.line = Some(line);
        fault.fatal = true;
        fault
    }

    /// Unrecoverable stop, e.g. the operation budget ran out.
    pub fn fatal(kind: impl Into<String>, message: impl Into<String>) -> Self {
        let mut fault = Self::new(kind, message);
        fault.fatal = true;
        fault
    }

    /// Attach a line number unless one is already recorded.
    pub fn at_line(mut self, line: usize) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
        }
        self
    }

    pub fn matches(&self, handler_kind: &str) -> bool {
        !self.fatal && is_subclass(&self.kind, handler_kind)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind)?;
        } else {
            write!(f, "{}: {}", self.kind, self.message)?;
        }
        if let Some(line) = self.line {
            write!(f, " (line {})", line)?;
        }
        Ok(())
    }
}

impl std::error::Error for Fault {}

pub type Eval<T> = Result<T, Fault>;

/// `unit * times` items, or a MemoryError when that exceeds [`MAX_ALLOC_ITEMS`].
pub fn alloc_len(unit: usize, times: usize) -> Eval<usize> {
    unit.checked_mul(times)
        .filter(|n| *n <= MAX_ALLOC_ITEMS)
        .ok_or_else(|| Fault::memory_error(format!("cannot allocate {} x {} items", unit, times)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hierarchy() {
        assert!(is_subclass("KeyError", "LookupError"));
        assert!(is_subclass("KeyError", "Exception"));
        assert!(!is_subclass("KeyError", "ValueError"));
        assert!(is_subclass("ZeroDivisionError", "ArithmeticError"));
    }

    #[test]
    fn test_fatal_faults_are_not_caught() {
        let fault = Fault::fatal("RuntimeError", "operation budget exhausted");
        assert!(!fault.matches("Exception"));
        assert!(Fault::value_error("bad").matches("Exception"));
    }

    #[test]
    fn test_alloc_len_limit() {
        assert_eq!(alloc_len(3, 4).unwrap(), 12);
        assert_eq!(alloc_len(0, usize::MAX).unwrap(), 0);
        let fault = alloc_len(MAX_ALLOC_ITEMS, 2).unwrap_err();
        assert_eq!(fault.kind, "MemoryError");
        assert!(!fault.fatal);
        assert!(fault.matches("Exception"));
        assert_eq!(alloc_len(usize::MAX, 2).unwrap_err().kind, "MemoryError");
    }

    #[test]
    fn test_display_with_line() {
        let fault = Fault::name_error("x").at_line(3).at_line(9);
        assert_eq!(fault.to_string(), "NameError: name 'x' is not defined (line 3)");
    }
}
