/// Broad failure category. Each kind maps to a distinct process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing/malformed data file, unreadable or unwritable output.
    Input,
    /// Inputs that cannot be fit (zero sigmas, empty dataset, bad settings).
    Validation,
    /// The least-squares solver did not converge.
    FitFailed,
    /// A model function was evaluated outside its domain (e.g. flux <= 0).
    NumericalDomain,
    /// Adaptive quadrature could not reach the requested tolerance.
    Integration,
}

impl ErrorKind {
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::Input => 2,
            ErrorKind::Validation => 3,
            ErrorKind::FitFailed => 4,
            ErrorKind::NumericalDomain => 5,
            ErrorKind::Integration => 6,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::Input => "input error",
            ErrorKind::Validation => "validation error",
            ErrorKind::FitFailed => "fit failed",
            ErrorKind::NumericalDomain => "numerical domain error",
            ErrorKind::Integration => "integration error",
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    kind: ErrorKind,
    message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Input, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn fit_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FitFailed, message)
    }

    pub fn domain(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NumericalDomain, message)
    }

    pub fn integration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Integration, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn exit_code(&self) -> u8 {
        self.kind.exit_code()
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.label(), self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
