//! Demo login: name and phone, a fixed one-time code, then admin password or
//! guest access. Nothing here is real authentication.

use super::{Role, Session, SessionUser};
use crate::clock::now_millis;
use crate::config::SessionConfig;
use crate::error::{HubError, Result};
use crate::users::UserDirectory;
use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStep {
    Details,
    Otp,
    ChooseRole,
}

/// Written to the users path on every successful login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginRecord {
    pub name: String,
    pub phone: String,
    pub role: Role,
    /// Epoch milliseconds
    pub timestamp: i64,
}

pub struct LoginFlow {
    step: LoginStep,
    name: String,
    phone: String,
    otp: String,
    admin_password: String,
}

fn rejected(message: &str) -> HubError {
    HubError::Validation(message.to_string())
}

impl LoginFlow {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            step: LoginStep::Details,
            name: String::new(),
            phone: String::new(),
            otp: config.demo_otp.clone(),
            admin_password: config.admin_password.clone(),
        }
    }

    pub fn step(&self) -> LoginStep {
        self.step
    }

    pub fn submit_details(&mut self, name: &str, phone: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(rejected("Enter your name"));
        }
        if phone.chars().count() < 10 {
            return Err(rejected("Enter valid phone number"));
        }
        self.name = name.trim().to_string();
        self.phone = phone.to_string();
        self.step = LoginStep::Otp;
        info!("[Session] OTP sent to +91{}", self.phone);
        Ok(())
    }

    pub fn verify_otp(&mut self, otp: &str) -> Result<()> {
        if self.step != LoginStep::Otp {
            return Err(rejected("Enter your details first"));
        }
        if otp.trim() != self.otp {
            return Err(rejected("Wrong OTP"));
        }
        self.step = LoginStep::ChooseRole;
        Ok(())
    }

    pub fn login_admin(&self, password: &str) -> Result<LoginRecord> {
        self.ensure_verified()?;
        if password != self.admin_password {
            return Err(rejected("Wrong admin password"));
        }
        Ok(self.record(Role::Admin))
    }

    pub fn login_guest(&self) -> Result<LoginRecord> {
        self.ensure_verified()?;
        Ok(self.record(Role::Guest))
    }

    fn ensure_verified(&self) -> Result<()> {
        if self.step != LoginStep::ChooseRole {
            return Err(rejected("Verify the OTP first"));
        }
        Ok(())
    }

    fn record(&self, role: Role) -> LoginRecord {
        LoginRecord {
            name: self.name.clone(),
            phone: self.phone.clone(),
            role,
            timestamp: now_millis(),
        }
    }
}

/// Finish a login: log it in the user directory and persist the session.
/// A failed directory write is logged; the user is still signed in.
pub async fn complete(
    record: LoginRecord,
    session: &Session,
    directory: &UserDirectory,
) -> Result<()> {
    if let Err(e) = directory.record_login(&record).await {
        warn!("[Session] Could not record login for {}: {}", record.name, e);
    }
    session.sign_in(SessionUser {
        name: record.name,
        role: record.role,
    })
}
