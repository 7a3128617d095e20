use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("buffer too short to hold the report block")]
    ErrBufferTooShort,
    #[error("unexpected end of buffer: expected {expected} bytes, got {actual}")]
    UnexpectedEndOfBuffer { expected: usize, actual: usize },

    //RTCP XR errors
    #[error("invalid extended report block type: {0}")]
    ErrInvalidBlockType(u8),
    #[error("invalid extended report block length: {0}")]
    ErrInvalidBlockLength(u16),
    #[error("no extended report block requested")]
    ErrNoReportBlockRequested,

    //Analyzer errors
    #[error("media quality analyzer already running")]
    ErrAnalyzerAlreadyRunning,
    #[error("media quality analyzer stopped")]
    ErrAnalyzerStopped,

    #[error("mutex poison: {0}")]
    PoisonError(String),
    #[error("{0}")]
    Io(#[source] IoError),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
#[error("io error: {0}")]
pub struct IoError(#[from] pub io::Error);

// Workaround for wanting PartialEq for io::Error.
impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(IoError(e))
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Error::PoisonError(e.to_string())
    }
}

/// flatten_errs flattens multiple errors into one
pub fn flatten_errs(errs: Vec<impl Into<Error>>) -> Result<()> {
    if errs.is_empty() {
        Ok(())
    } else {
        let errs_strs: Vec<String> = errs.into_iter().map(|e| e.into().to_string()).collect();
        Err(Error::Other(errs_strs.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_errs() {
        assert_eq!(flatten_errs(Vec::<Error>::new()), Ok(()));

        let result = flatten_errs(vec![Error::ErrAnalyzerStopped, Error::ErrBufferTooShort]);
        assert_eq!(
            result,
            Err(Error::Other(
                "media quality analyzer stopped\nbuffer too short to hold the report block"
                    .to_owned()
            ))
        );
    }

    #[test]
    fn test_poison_error_conversion() {
        let lock = std::sync::Arc::new(std::sync::Mutex::new(0u32));
        let cloned = lock.clone();
        let _ = std::thread::spawn(move || {
            let _guard = cloned.lock().unwrap();
            panic!("poison");
        })
        .join();

        let err: Error = lock.lock().unwrap_err().into();
        assert!(matches!(err, Error::PoisonError(_)));
    }
}
