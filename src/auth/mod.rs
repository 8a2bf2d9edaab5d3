//! Authentication module
//!
//! Stores the API token between invocations and resolves which token a
//! command should use. Token refresh is not supported; a rejected token shows
//! up as a 401 in the usual transfer messages.

use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::path::Path;
use thiserror::Error;

/// Maximum number of prompt attempts before giving up
pub const MAX_PROMPT_ATTEMPTS: usize = 3;

/// Authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Failed to access credentials '{0}': {1}")]
    IoError(String, #[source] std::io::Error),

    #[error("Invalid credentials file '{0}': {1}")]
    ParseError(String, #[source] serde_json::Error),

    #[error("No token entered after {0} attempts")]
    NoTokenEntered(usize),
}

/// Stored credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub token: String,
}

impl Credentials {
    /// Load stored credentials; `Ok(None)` when nothing is stored
    pub fn load(path: &Path) -> Result<Option<Self>, AuthError> {
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content)
                .map(Some)
                .map_err(|e| AuthError::ParseError(path.display().to_string(), e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AuthError::IoError(path.display().to_string(), e)),
        }
    }

    /// Persist credentials, creating parent directories as needed
    pub fn save(&self, path: &Path) -> Result<(), AuthError> {
        let io_err = |e| AuthError::IoError(path.display().to_string(), e);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| AuthError::ParseError(path.display().to_string(), e))?;

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path).map_err(io_err)?;

        // An existing file keeps its old mode on open, so tighten it before writing
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))
                .map_err(io_err)?;
        }
        file.write_all(content.as_bytes()).map_err(io_err)?;
        file.flush().map_err(io_err)?;
        Ok(())
    }
}

/// Pick the token for a command: configured token first, then stored credentials
pub fn resolve_token(
    configured: Option<&str>,
    credentials_path: &Path,
) -> Result<Option<String>, AuthError> {
    if let Some(token) = configured.map(str::trim).filter(|t| !t.is_empty()) {
        return Ok(Some(token.to_string()));
    }
    Ok(Credentials::load(credentials_path)?.map(|c| c.token))
}

/// Ask for a token on `output`, reading answers from `input`
///
/// Blank answers are rejected; after [`MAX_PROMPT_ATTEMPTS`] the prompt
/// gives up instead of asking forever.
pub fn prompt_token<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<String, AuthError> {
    let io_err = |e| AuthError::IoError("terminal".to_string(), e);
    for attempt in 1..=MAX_PROMPT_ATTEMPTS {
        write!(output, "API token: ").map_err(io_err)?;
        output.flush().map_err(io_err)?;

        let mut line = String::new();
        if input.read_line(&mut line).map_err(io_err)? == 0 {
            break;
        }
        let token = line.trim();
        if !token.is_empty() {
            return Ok(token.to_string());
        }
        if attempt < MAX_PROMPT_ATTEMPTS {
            writeln!(output, "The token cannot be empty.").map_err(io_err)?;
        }
    }
    Err(AuthError::NoTokenEntered(MAX_PROMPT_ATTEMPTS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth/credentials.json");
        let credentials = Credentials {
            token: "abc123".into(),
        };
        credentials.save(&path).unwrap();
        assert_eq!(Credentials::load(&path).unwrap(), Some(credentials));
    }

    #[cfg(unix)]
    #[test]
    fn test_save_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, "{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        Credentials {
            token: "abc123".into(),
        }
        .save(&path)
        .unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        let fresh = dir.path().join("fresh/credentials.json");
        Credentials {
            token: "def456".into(),
        }
        .save(&fresh)
        .unwrap();
        let mode = std::fs::metadata(&fresh).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_load_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Credentials::load(&dir.path().join("none.json")).unwrap(), None);
    }

    #[test]
    fn test_resolve_prefers_configured_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        Credentials {
            token: "stored".into(),
        }
        .save(&path)
        .unwrap();

        assert_eq!(
            resolve_token(Some("configured"), &path).unwrap().as_deref(),
            Some("configured")
        );
        assert_eq!(resolve_token(Some("  "), &path).unwrap().as_deref(), Some("stored"));
        assert_eq!(resolve_token(None, &path).unwrap().as_deref(), Some("stored"));
    }

    #[test]
    fn test_prompt_retries_blank_answers() {
        let mut input = Cursor::new("\n  \ntoken-xyz\n");
        let mut output = Vec::new();
        let token = prompt_token(&mut input, &mut output).unwrap();
        assert_eq!(token, "token-xyz");
        let shown = String::from_utf8(output).unwrap();
        assert_eq!(shown.matches("API token: ").count(), 3);
    }

    #[test]
    fn test_prompt_is_bounded() {
        let mut input = Cursor::new("\n\n\n\nlate-token\n");
        let mut output = Vec::new();
        let result = prompt_token(&mut input, &mut output);
        assert!(matches!(result, Err(AuthError::NoTokenEntered(3))));
    }

    #[test]
    fn test_prompt_stops_at_eof() {
        let mut input = Cursor::new("");
        let mut output = Vec::new();
        assert!(prompt_token(&mut input, &mut output).is_err());
    }
}
