//! Merchant-side settings for report generation and delivery.
//!
//! Storage of settings is owned by the operator tooling; this module only
//! defines the shape plus JSON load/save helpers, and the two precondition
//! checks the scheduler consults before attempting anything.

use crate::formatter::ReportKind;
use crate::Result;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Credentials for one report type's file-transfer account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCredentials {
    pub host: String,
    pub login: String,
    pub password: String,
}

impl ChannelCredentials {
    pub fn is_complete(&self) -> bool {
        !(self.host.is_empty() || self.login.is_empty() || self.password.is_empty())
    }

    /// Each account always uploads to the same remote name, so successive
    /// weekly reports overwrite the previous file.
    pub fn remote_file_name(&self) -> String {
        format!("{}.txt", self.login)
    }
}

/// All configuration the report engine and deliverer read.
///
/// Every field is read-only during a build; mutation happens only through
/// whatever admin surface persists this struct.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SoundscanConfig {
    /// Assigned chain number (e.g. `040xx`).
    pub chain_no: String,
    pub account_no_physical: String,
    pub account_no_digital: String,

    pub ftp_host: String,
    pub ftp_login_physical: String,
    pub ftp_password_physical: String,
    pub ftp_login_digital: String,
    pub ftp_password_digital: String,

    /// Product category marking an item as music at all.
    pub music_category: String,
    /// Sub-category marking a music item as an album.
    pub album_category: String,
    /// Sub-category marking a music item as a track (single).
    pub track_category: String,

    /// Product attribute names carrying the identifying codes.
    pub ean_attribute: String,
    pub upc_attribute: String,
    pub isrc_attribute: String,

    pub min_album_price_physical: Decimal,
    pub min_track_price_physical: Decimal,
    pub min_album_price_digital: Decimal,
    pub min_track_price_digital: Decimal,

    /// Field delimiter for the digital layout (single character).
    pub digital_delimiter: String,
}

impl Default for SoundscanConfig {
    fn default() -> Self {
        Self {
            chain_no: String::new(),
            account_no_physical: String::new(),
            account_no_digital: String::new(),
            ftp_host: String::new(),
            ftp_login_physical: String::new(),
            ftp_password_physical: String::new(),
            ftp_login_digital: String::new(),
            ftp_password_digital: String::new(),
            music_category: String::new(),
            album_category: String::new(),
            track_category: String::new(),
            ean_attribute: String::new(),
            upc_attribute: String::new(),
            isrc_attribute: String::new(),
            min_album_price_physical: Decimal::ZERO,
            min_track_price_physical: Decimal::ZERO,
            min_album_price_digital: Decimal::ZERO,
            min_track_price_digital: Decimal::ZERO,
            digital_delimiter: "|".to_string(),
        }
    }
}

impl SoundscanConfig {
    /// Load settings from a JSON file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn account_no(&self, kind: ReportKind) -> &str {
        match kind {
            ReportKind::Physical => &self.account_no_physical,
            ReportKind::Digital => &self.account_no_digital,
        }
    }

    pub fn credentials(&self, kind: ReportKind) -> ChannelCredentials {
        match kind {
            ReportKind::Physical => ChannelCredentials {
                host: self.ftp_host.clone(),
                login: self.ftp_login_physical.clone(),
                password: self.ftp_password_physical.clone(),
            },
            ReportKind::Digital => ChannelCredentials {
                host: self.ftp_host.clone(),
                login: self.ftp_login_digital.clone(),
                password: self.ftp_password_digital.clone(),
            },
        }
    }

    pub fn min_album_price(&self, kind: ReportKind) -> Decimal {
        match kind {
            ReportKind::Physical => self.min_album_price_physical,
            ReportKind::Digital => self.min_album_price_digital,
        }
    }

    pub fn min_track_price(&self, kind: ReportKind) -> Decimal {
        match kind {
            ReportKind::Physical => self.min_track_price_physical,
            ReportKind::Digital => self.min_track_price_digital,
        }
    }

    /// True only if a build for `kind` can produce useful output: chain and
    /// account numbers plus the music category mapping, and for digital the
    /// ISRC attribute mapping as well.
    pub fn has_necessary_options(&self, kind: ReportKind) -> bool {
        let base = !(self.chain_no.is_empty()
            || self.account_no(kind).is_empty()
            || self.music_category.is_empty());
        match kind {
            ReportKind::Physical => base,
            ReportKind::Digital => base && !self.isrc_attribute.is_empty(),
        }
    }

    /// True if the delivery credentials for `kind` are complete. Kept
    /// separate from [`Self::has_necessary_options`] so the operator can
    /// tell a settings problem from a transfer problem.
    pub fn has_credentials(&self, kind: ReportKind) -> bool {
        self.credentials(kind).is_complete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn configured() -> SoundscanConfig {
        SoundscanConfig {
            chain_no: "04012".to_string(),
            account_no_physical: "55501".to_string(),
            account_no_digital: "55502".to_string(),
            ftp_host: "transfer.example.com".to_string(),
            ftp_login_physical: "phys".to_string(),
            ftp_password_physical: "secret".to_string(),
            ftp_login_digital: "digi".to_string(),
            ftp_password_digital: "secret".to_string(),
            music_category: "Music".to_string(),
            album_category: "Albums".to_string(),
            track_category: "Singles".to_string(),
            ean_attribute: "ean".to_string(),
            upc_attribute: "upc".to_string(),
            isrc_attribute: "isrc".to_string(),
            min_album_price_physical: dec!(4.99),
            min_track_price_physical: dec!(0.99),
            min_album_price_digital: dec!(4.99),
            min_track_price_digital: dec!(0.99),
            ..Default::default()
        }
    }

    #[test]
    fn necessary_options_per_kind() {
        let config = configured();
        assert!(config.has_necessary_options(ReportKind::Physical));
        assert!(config.has_necessary_options(ReportKind::Digital));

        let mut no_isrc = configured();
        no_isrc.isrc_attribute.clear();
        assert!(no_isrc.has_necessary_options(ReportKind::Physical));
        assert!(!no_isrc.has_necessary_options(ReportKind::Digital));

        let mut no_chain = configured();
        no_chain.chain_no.clear();
        assert!(!no_chain.has_necessary_options(ReportKind::Physical));
    }

    #[test]
    fn credentials_completeness() {
        let config = configured();
        assert!(config.has_credentials(ReportKind::Physical));

        let mut missing_pwd = configured();
        missing_pwd.ftp_password_digital.clear();
        assert!(missing_pwd.has_credentials(ReportKind::Physical));
        assert!(!missing_pwd.has_credentials(ReportKind::Digital));
    }

    #[test]
    fn remote_file_name_follows_login() {
        let creds = configured().credentials(ReportKind::Digital);
        assert_eq!(creds.remote_file_name(), "digi.txt");
    }

    #[test]
    fn load_save_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let config = configured();
        config.save(&path).unwrap();
        let loaded = SoundscanConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn load_missing_file_is_default() {
        let dir = tempdir().unwrap();
        let loaded = SoundscanConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, SoundscanConfig::default());
        assert!(!loaded.has_necessary_options(ReportKind::Physical));
    }
}
