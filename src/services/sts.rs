//! MFA session-token exchange
//!
//! When MFA is enabled, applying settings first swaps the long-lived keys for
//! temporary session credentials: look up the caller's first MFA device, then
//! ask STS for a session token bound to that device and the entered code.
//! Both calls run serially before the new settings take effect.

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_s3::config::{Credentials, Region};
#[cfg(test)]
use mockall::automock;

use crate::model::error::StoreError;
use crate::services::s3_store::classify_service;
use crate::settings::{CredentialSettings, Settings};

/// Session tokens last an hour, matching the default console session
const SESSION_TOKEN_DURATION_SECS: i32 = 3600;

/// Temporary credentials returned by the exchange
#[derive(Debug, Clone, PartialEq)]
pub struct SessionCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
}

impl From<SessionCredentials> for CredentialSettings {
    fn from(creds: SessionCredentials) -> CredentialSettings {
        CredentialSettings {
            access_key_id: creds.access_key_id,
            secret_access_key: creds.secret_access_key,
            session_token: Some(creds.session_token),
        }
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    /// Serial number of the caller's first registered MFA device
    async fn first_mfa_device(&self) -> Result<String, StoreError>;

    /// Exchange the device serial and a fresh TOTP code for session credentials
    async fn session_token(
        &self,
        serial: &str,
        code: &str,
    ) -> Result<SessionCredentials, StoreError>;
}

/// Production exchanger over `aws-sdk-iam` and `aws-sdk-sts`
pub struct StsTokenExchanger {
    iam: aws_sdk_iam::Client,
    sts: aws_sdk_sts::Client,
}

impl StsTokenExchanger {
    /// Build clients signed with the long-lived keys from `settings`
    pub async fn new(settings: &Settings) -> StsTokenExchanger {
        let region_provider = if settings.region.is_empty() {
            RegionProviderChain::default_provider().or_else(Region::new("us-east-1"))
        } else {
            RegionProviderChain::first_try(Region::new(settings.region.clone()))
                .or_default_provider()
                .or_else(Region::new("us-east-1"))
        };
        let shared_config = aws_config::from_env()
            .region(region_provider)
            .credentials_provider(Credentials::new(
                settings.credentials.access_key_id.clone(),
                settings.credentials.secret_access_key.clone(),
                None,
                None,
                "settings",
            ))
            .load()
            .await;
        StsTokenExchanger {
            iam: aws_sdk_iam::Client::new(&shared_config),
            sts: aws_sdk_sts::Client::new(&shared_config),
        }
    }
}

#[async_trait]
impl TokenExchanger for StsTokenExchanger {
    async fn first_mfa_device(&self) -> Result<String, StoreError> {
        let output = self
            .iam
            .list_mfa_devices()
            .send()
            .await
            .map_err(|e| classify_service(e.into_service_error()))?;
        output
            .mfa_devices()
            .first()
            .map(|device| device.serial_number().to_string())
            .ok_or_else(|| StoreError::NotFound("no MFA device registered".to_string()))
    }

    async fn session_token(
        &self,
        serial: &str,
        code: &str,
    ) -> Result<SessionCredentials, StoreError> {
        let output = self
            .sts
            .get_session_token()
            .duration_seconds(SESSION_TOKEN_DURATION_SECS)
            .serial_number(serial)
            .token_code(code)
            .send()
            .await
            .map_err(|e| classify_service(e.into_service_error()))?;
        let creds = output.credentials().ok_or_else(|| {
            StoreError::Transport("session token response carried no credentials".to_string())
        })?;
        Ok(SessionCredentials {
            access_key_id: creds.access_key_id().to_string(),
            secret_access_key: creds.secret_access_key().to_string(),
            session_token: creds.session_token().to_string(),
        })
    }
}
