#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// A scenario failed while running (a worker could not run one of its VUs).
    ExecutionFailed = 20,

    /// Invalid CLI flags or test definition (unreadable file, bad YAML, unknown executor, etc.).
    InvalidInput = 30,

    /// Internal/runtime error (IO errors, broken worker pool, panics in executor tasks).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}
