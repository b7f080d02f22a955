//! Guest authorization gate
//!
//! An unauthenticated identity proves control of a phone number with a short
//! one-time code before it may submit a request. The OTP service hands the
//! code back directly; verification is a local comparison.
//!
//! ```text
//! Unverified --issue--> CodeIssued --match--> Verified
//!                       CodeIssued --mismatch--> CodeIssued (until the attempt limit)
//!                       CodeIssued --expired / locked out--> Unverified
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::GuestConfig;
use crate::directory::send_checked;
use crate::error::{CoreError, Result};

#[async_trait]
pub trait OtpService: Send + Sync {
    /// Ask for a fresh code for `phone`; returns the issued code.
    async fn send_otp(&self, phone: &str) -> Result<String>;
}

/// reqwest-backed OTP service client (`POST /send-otp`)
pub struct HttpOtp {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpOtp {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl OtpService for HttpOtp {
    async fn send_otp(&self, phone: &str) -> Result<String> {
        let request = self
            .client
            .post(format!("{}/send-otp", self.base_url))
            .json(&json!({ "phone": phone }));
        let response = send_checked(request, "/send-otp", self.timeout).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| CoreError::from_transport(e, self.timeout.as_millis() as u64))?;

        match body.get("otp") {
            Some(Value::String(code)) if !code.trim().is_empty() => Ok(code.trim().to_string()),
            Some(Value::Number(code)) => Ok(code.to_string()),
            _ => Err(CoreError::InvalidResponse(
                "OTP service answered without a code".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuestState {
    Unverified,
    CodeIssued,
    Verified,
}

#[derive(Debug, Clone, Default)]
pub struct GuestSession {
    pub phone: Option<String>,
    pub issued_code: Option<String>,
    pub verified: bool,
    pub issued_at: Option<Instant>,
    pub attempts: u32,
}

impl GuestSession {
    fn invalidate_code(&mut self) {
        self.issued_code = None;
        self.issued_at = None;
        self.attempts = 0;
    }
}

/// Gate holding at most one deferred action of type `P`
pub struct GuestGate<P> {
    otp: Arc<dyn OtpService>,
    config: GuestConfig,
    session: GuestSession,
    pending: Option<P>,
}

impl<P> GuestGate<P> {
    pub fn new(otp: Arc<dyn OtpService>, config: GuestConfig) -> Self {
        Self {
            otp,
            config,
            session: GuestSession::default(),
            pending: None,
        }
    }

    pub fn state(&self) -> GuestState {
        if self.session.verified {
            GuestState::Verified
        } else if self.session.issued_code.is_some() {
            GuestState::CodeIssued
        } else {
            GuestState::Unverified
        }
    }

    pub fn session(&self) -> &GuestSession {
        &self.session
    }

    /// Park an action until verification succeeds. A newer one replaces it.
    pub fn defer(&mut self, action: P) {
        if self.pending.replace(action).is_some() {
            debug!("Replaced deferred action");
        }
    }

    pub fn pending(&self) -> Option<&P> {
        self.pending.as_ref()
    }

    /// Digits of the phone the current code or verification belongs to.
    pub fn phone(&self) -> Option<&str> {
        self.session.phone.as_deref()
    }

    /// Request a fresh code for `phone`; any earlier code stops working.
    ///
    /// A verified session stays verified; asking it for another code is refused.
    pub async fn issue_code(&mut self, phone: &str) -> Result<String> {
        if self.session.verified {
            return Err(CoreError::Validation("phone is already verified".to_string()));
        }
        let digits = digits_of(phone);
        if digits.len() < self.config.min_phone_digits {
            return Err(CoreError::Validation(format!(
                "phone number needs at least {} digits",
                self.config.min_phone_digits
            )));
        }

        // Invalidate before the call so a failed re-issue leaves no usable code
        self.session.invalidate_code();
        let code = self.otp.send_otp(phone.trim()).await?;

        self.session = GuestSession {
            phone: Some(digits),
            issued_code: Some(code.clone()),
            verified: false,
            issued_at: Some(Instant::now()),
            attempts: 0,
        };
        info!("One-time code issued");
        Ok(code)
    }

    /// Check `submitted` against the latest code for `phone`.
    ///
    /// On success the session is verified and the deferred action, if any, is
    /// handed back for the caller to resume.
    pub fn verify_code(&mut self, phone: &str, submitted: &str) -> Result<Option<P>> {
        let submitted = submitted.trim();
        if submitted.is_empty() || !submitted.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CoreError::Validation("enter the code you received".to_string()));
        }

        let digits = digits_of(phone);
        if self.session.verified {
            if self.session.phone.as_deref() != Some(digits.as_str()) {
                return Err(CoreError::Authorization(
                    "a different phone is already verified".to_string(),
                ));
            }
            return Ok(self.pending.take());
        }

        let (Some(code), Some(issued_at)) = (&self.session.issued_code, self.session.issued_at) else {
            return Err(CoreError::Authorization(
                "no code has been issued, request one first".to_string(),
            ));
        };
        if self.session.phone.as_deref() != Some(digits.as_str()) {
            return Err(CoreError::Authorization(
                "no code has been issued for this phone".to_string(),
            ));
        }

        if issued_at.elapsed() > Duration::from_secs(self.config.code_ttl_secs) {
            self.session.invalidate_code();
            warn!("One-time code expired");
            return Err(CoreError::Authorization(
                "code expired, request a new one".to_string(),
            ));
        }

        if submitted != code.as_str() {
            self.session.attempts += 1;
            if self.session.attempts >= self.config.max_verify_attempts {
                self.session.invalidate_code();
                warn!("Too many wrong codes, code invalidated");
                return Err(CoreError::Authorization(
                    "too many wrong codes, request a new one".to_string(),
                ));
            }
            debug!(attempts = self.session.attempts, "Wrong code");
            return Err(CoreError::Authorization(
                "incorrect code, please try again".to_string(),
            ));
        }

        self.session.verified = true;
        self.session.invalidate_code();
        info!("Guest phone verified");
        Ok(self.pending.take())
    }
}

fn digits_of(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}
