use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read country list {}: {source}", path.display())]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write report {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AppError {
    /// Process exit code reported for a run that ends with this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) => 78,
            AppError::Input { .. } => 66,
            AppError::Output { .. } => 74,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error() {
        let error = AppError::Config("GEMINI_API_KEY must be set".to_string());
        assert_eq!(
            error.to_string(),
            "Configuration error: GEMINI_API_KEY must be set"
        );
    }

    #[test]
    fn test_input_error_names_path() {
        let error = AppError::Input {
            path: PathBuf::from("List_of_Countries.txt"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        assert_eq!(
            error.to_string(),
            "Failed to read country list List_of_Countries.txt: no such file"
        );
    }

    #[test]
    fn test_output_error_keeps_source() {
        let error = AppError::Output {
            path: PathBuf::from("/readonly/Risk_Report.md"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(error.to_string().contains("/readonly/Risk_Report.md"));
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_exit_codes() {
        let test_cases = vec![
            (AppError::Config("test".to_string()), 78),
            (
                AppError::Input {
                    path: PathBuf::from("in.txt"),
                    source: std::io::Error::other("x"),
                },
                66,
            ),
            (
                AppError::Output {
                    path: PathBuf::from("out.md"),
                    source: std::io::Error::other("x"),
                },
                74,
            ),
        ];

        for (error, expected) in test_cases {
            assert_eq!(error.exit_code(), expected, "exit code for {error}");
        }
    }

    #[test]
    fn test_app_result_err() {
        fn returns_err() -> AppResult<i32> {
            Err(AppError::Config("test".to_string()))
        }
        assert!(returns_err().is_err());
    }
}
