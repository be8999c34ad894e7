use thiserror::Error;

pub type ProbeResult<T> = Result<T, ProbeError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeErrorKind {
    Connect,
    Send,
    Receive,
    Timeout,
    Rejected,
    Parse,
    InvalidUrl,
    Unhealthy,
    Io,
    Internal,
}

#[derive(Clone, Debug, Error)]
#[error("probe error {kind:?} status={status:?} {message}")]
pub struct ProbeError {
    pub kind: ProbeErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl ProbeError {
    pub fn new(kind: ProbeErrorKind, status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            message: message.into(),
        }
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(ProbeErrorKind::Connect, None, message)
    }

    pub fn send(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::new(ProbeErrorKind::Send, status, message)
    }

    pub fn receive(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::new(ProbeErrorKind::Receive, status, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProbeErrorKind::Timeout, None, message)
    }

    /// Non-2xx answer from the service. The body is kept as lossy text.
    pub fn rejected(status: u16, body: &[u8]) -> Self {
        let message = if body.is_empty() {
            "empty body".to_string()
        } else {
            String::from_utf8_lossy(body).into_owned()
        };
        Self::new(ProbeErrorKind::Rejected, Some(status), message)
    }

    pub fn invalid_url(url: &str, reason: impl std::fmt::Display) -> Self {
        Self::new(ProbeErrorKind::InvalidUrl, None, format!("{url}: {reason}"))
    }

    pub fn unhealthy(status: &str) -> Self {
        Self::new(
            ProbeErrorKind::Unhealthy,
            None,
            format!("service reported status {status:?}"),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ProbeErrorKind::Internal, None, message)
    }

    pub fn kind(&self) -> ProbeErrorKind {
        self.kind
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Timeouts and refused connections keep their own kind wherever they
    /// happen; anything else is reported as `fallback`.
    pub(crate) fn from_reqwest(err: reqwest::Error, fallback: ProbeErrorKind) -> Self {
        let status = err.status().map(|s| s.as_u16());
        let message = err.to_string();
        if err.is_timeout() {
            Self::timeout(message)
        } else if err.is_connect() {
            Self::connect(message)
        } else {
            Self::new(fallback, status, message)
        }
    }
}

impl From<sonic_rs::Error> for ProbeError {
    fn from(err: sonic_rs::Error) -> Self {
        Self::new(ProbeErrorKind::Parse, None, err.to_string())
    }
}

impl From<std::io::Error> for ProbeError {
    fn from(err: std::io::Error) -> Self {
        Self::new(ProbeErrorKind::Io, None, err.to_string())
    }
}
