//! Human consent step of the authorization-code flow.

use std::io::{BufRead, Write};

use log::{info, warn};

use super::authorize_uri::parse_authorization_code;
use crate::error::{EnrichError, Result};

/// Produces an authorization code for a consent URL.
///
/// This is the only step that may block on a human. It has no timeout.
pub trait ConsentProvider {
    fn obtain_authorization_code(&mut self, authorize_url: &str) -> Result<String>;
}

/// Opens the consent URL in the default browser and reads the redirected URL
/// back from the terminal.
pub struct BrowserConsent<R, W> {
    input: R,
    prompt: W,
    open_browser: bool,
}

impl BrowserConsent<std::io::StdinLock<'static>, std::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout(), true)
    }
}

impl<R: BufRead, W: Write> BrowserConsent<R, W> {
    pub fn new(input: R, prompt: W, open_browser: bool) -> Self {
        Self {
            input,
            prompt,
            open_browser,
        }
    }

    fn write_prompt(&mut self, text: &str) -> Result<()> {
        let io_err = |err| EnrichError::Consent(format!("failed to write prompt: {err}"));
        self.prompt.write_all(text.as_bytes()).map_err(io_err)?;
        self.prompt.flush().map_err(io_err)
    }
}

impl<R: BufRead, W: Write> ConsentProvider for BrowserConsent<R, W> {
    fn obtain_authorization_code(&mut self, authorize_url: &str) -> Result<String> {
        self.write_prompt(&format!("Please log in: {authorize_url}\n"))?;
        if self.open_browser {
            if let Err(err) = webbrowser::open(authorize_url) {
                warn!("Failed to open browser for consent; open the URL manually. error={err}");
            }
        }
        self.write_prompt("Enter the URL you were redirected to: ")?;

        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .map_err(|err| EnrichError::Consent(format!("failed to read redirect URL: {err}")))?;
        if read == 0 {
            return Err(EnrichError::Consent(
                "input closed before a redirect URL was entered".to_string(),
            ));
        }
        let code = parse_authorization_code(&line).ok_or_else(|| {
            EnrichError::Consent("redirect URL does not contain an authorization code".to_string())
        })?;
        info!("Authorization code received");
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::{BrowserConsent, ConsentProvider};
    use crate::error::EnrichError;

    #[test]
    fn test_code_is_read_from_pasted_redirect() {
        let input = b"http://localhost/?code=abc123\n".as_slice();
        let mut prompt = Vec::new();
        let mut consent = BrowserConsent::new(input, &mut prompt, false);

        let code = consent
            .obtain_authorization_code("https://accounts.example.com/authorize?x=1")
            .expect("code should be parsed");
        assert_eq!(code, "abc123");

        let shown = String::from_utf8(prompt).expect("utf8 prompt");
        assert!(shown.contains("Please log in: https://accounts.example.com/authorize?x=1"));
        assert!(shown.ends_with("Enter the URL you were redirected to: "));
    }

    #[test]
    fn test_denied_consent_is_an_error() {
        let input = b"http://localhost/?error=access_denied\n".as_slice();
        let mut consent = BrowserConsent::new(input, Vec::new(), false);
        let result = consent.obtain_authorization_code("https://accounts.example.com/authorize");
        assert!(matches!(result, Err(EnrichError::Consent(_))));
    }

    #[test]
    fn test_closed_input_is_an_error() {
        let mut consent = BrowserConsent::new(b"".as_slice(), Vec::new(), false);
        let result = consent.obtain_authorization_code("https://accounts.example.com/authorize");
        assert!(matches!(result, Err(EnrichError::Consent(_))));
    }
}
