//! License records: construction, validation, export and import.
//!
//! A [`LicenseRecord`] serializes to the JSON payload GitLab expects
//! (`version`, `licensee`, `issued_at`, `expires_at`, `restrictions`, plus
//! optional notification dates). [`export`] validates the record and seals
//! it with an explicitly passed private key; [`import`] reverses that with
//! the matching public key.

pub mod envelope;

use std::fmt;

use chrono::{Days, NaiveDate};
use indexmap::IndexMap;
use rand::Rng;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    LICENSE_FORMAT_VERSION, LICENSE_ID_MAX, LICENSE_ID_MIN, LICENSEE_COMPANY, LICENSEE_EMAIL,
    LICENSEE_NAME, VALIDITY_DAYS,
};

/// Errors while exporting or importing a license.
#[derive(Error, Debug)]
pub enum LicenseError {
    #[error("invalid license: {0}")]
    Validation(String),

    #[error("failed to serialize license: {0}")]
    Serialize(serde_json::Error),

    #[error("failed to seal license with the private key: {0}")]
    Seal(rsa::Error),

    #[error("malformed license artifact: {0}")]
    Decode(String),

    #[error("license artifact was not sealed by the matching private key")]
    Unseal,

    #[error("license payload could not be parsed: {0}")]
    Payload(serde_json::Error),
}

/// GitLab subscription tier.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Starter,
    Premium,
    /// Unlocks every feature; what CI wants.
    #[default]
    Ultimate,
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Plan::Starter => write!(f, "starter"),
            Plan::Premium => write!(f, "premium"),
            Plan::Ultimate => write!(f, "ultimate"),
        }
    }
}

impl std::str::FromStr for Plan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "starter" => Ok(Plan::Starter),
            "premium" => Ok(Plan::Premium),
            "ultimate" => Ok(Plan::Ultimate),
            other => Err(format!(
                "unsupported plan: '{other}'. Supported: starter, premium, ultimate"
            )),
        }
    }
}

/// Identity of the license holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Licensee {
    pub name: String,
    pub company: String,
    pub email: String,
}

impl Default for Licensee {
    fn default() -> Self {
        Self {
            name: LICENSEE_NAME.to_string(),
            company: LICENSEE_COMPANY.to_string(),
            email: LICENSEE_EMAIL.to_string(),
        }
    }
}

impl Licensee {
    /// The capitalised key/value map GitLab stores, in display order.
    pub fn to_map(&self) -> IndexMap<String, String> {
        IndexMap::from([
            ("Name".to_string(), self.name.clone()),
            ("Company".to_string(), self.company.clone()),
            ("Email".to_string(), self.email.clone()),
        ])
    }
}

/// Plan and identifier constraints carried by a license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restrictions {
    pub plan: Plan,
    /// Random nonce identifying this license. Collisions are tolerated.
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_user_count: Option<u32>,
}

/// The license payload before sealing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseRecord {
    pub version: u32,
    pub licensee: IndexMap<String, String>,
    #[serde(rename = "issued_at")]
    pub starts_at: NaiveDate,
    pub expires_at: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify_admins_at: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify_users_at: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_changes_at: Option<NaiveDate>,
    pub restrictions: Restrictions,
}

/// Where a license stands relative to a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExpiryStatus {
    /// `today` is before `starts_at`.
    NotYetValid { days: i64 },
    Valid { days: i64 },
    /// One day or less of use left.
    ExpiringSoon { days: i64 },
    Expired,
}

/// The knobs that shape a freshly built record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseTemplate {
    pub licensee: Licensee,
    pub plan: Plan,
    pub validity_days: u32,
    pub active_user_count: Option<u32>,
}

impl Default for LicenseTemplate {
    fn default() -> Self {
        Self {
            licensee: Licensee::default(),
            plan: Plan::Ultimate,
            validity_days: VALIDITY_DAYS,
            active_user_count: None,
        }
    }
}

impl LicenseTemplate {
    /// Build a record valid from `now` for `validity_days`.
    pub fn build<R: Rng>(&self, now: NaiveDate, rng: &mut R) -> LicenseRecord {
        let expires_at = now
            .checked_add_days(Days::new(u64::from(self.validity_days)))
            .unwrap_or(NaiveDate::MAX);

        LicenseRecord {
            version: LICENSE_FORMAT_VERSION,
            licensee: self.licensee.to_map(),
            starts_at: now,
            expires_at,
            notify_admins_at: None,
            notify_users_at: None,
            block_changes_at: None,
            restrictions: Restrictions {
                plan: self.plan,
                id: rng.gen_range(LICENSE_ID_MIN..=LICENSE_ID_MAX),
                active_user_count: self.active_user_count,
            },
        }
    }
}

/// Build the standard CI license starting on `now`.
pub fn build_license_record(now: NaiveDate) -> LicenseRecord {
    LicenseTemplate::default().build(now, &mut rand::thread_rng())
}

impl LicenseRecord {
    /// Check the record is one GitLab will accept.
    pub fn validate(&self) -> Result<(), LicenseError> {
        if self.version != LICENSE_FORMAT_VERSION {
            return Err(LicenseError::Validation(format!(
                "unsupported format version {} (expected {LICENSE_FORMAT_VERSION})",
                self.version
            )));
        }
        if self.licensee.is_empty() {
            return Err(LicenseError::Validation("licensee must not be empty".to_string()));
        }
        if self.expires_at <= self.starts_at {
            return Err(LicenseError::Validation(format!(
                "expires_at ({}) must be after issued_at ({})",
                self.expires_at, self.starts_at
            )));
        }
        Ok(())
    }

    /// The `Name` licensee field, if present.
    pub fn licensee_name(&self) -> Option<&str> {
        self.licensee.get("Name").map(String::as_str)
    }

    /// Whole days between `starts_at` and `expires_at`.
    pub fn validity_days(&self) -> i64 {
        (self.expires_at - self.starts_at).num_days()
    }

    /// Classify the license relative to `today`.
    ///
    /// Matches GitLab's rule: a license is expired on its `expires_at` day.
    pub fn expiry_status(&self, today: NaiveDate) -> ExpiryStatus {
        if today < self.starts_at {
            return ExpiryStatus::NotYetValid {
                days: (self.starts_at - today).num_days(),
            };
        }
        let days = (self.expires_at - today).num_days();
        match days {
            d if d <= 0 => ExpiryStatus::Expired,
            1 => ExpiryStatus::ExpiringSoon { days },
            _ => ExpiryStatus::Valid { days },
        }
    }
}

/// Validate, serialize and seal `record` with `key`.
pub fn export(record: &LicenseRecord, key: &RsaPrivateKey) -> Result<String, LicenseError> {
    record.validate()?;
    let payload = serde_json::to_vec(record).map_err(LicenseError::Serialize)?;
    envelope::seal(&payload, key)
}

/// Open and validate an artifact produced by [`export`].
pub fn import(artifact: &str, key: &RsaPublicKey) -> Result<LicenseRecord, LicenseError> {
    let payload = envelope::open(artifact, key)?;
    let record: LicenseRecord =
        serde_json::from_slice(&payload).map_err(LicenseError::Payload)?;
    record.validate()?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::tests::test_key_pair;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn build_sets_two_day_window() {
        let record = build_license_record(date(2022, 6, 1));
        assert_eq!(record.starts_at, date(2022, 6, 1));
        assert_eq!(record.expires_at, date(2022, 6, 3));
        assert_eq!(record.validity_days(), 2);
    }

    #[test]
    fn build_crosses_month_and_year_boundaries() {
        let record = build_license_record(date(2022, 12, 31));
        assert_eq!(record.expires_at, date(2023, 1, 2));
    }

    #[test]
    fn build_uses_ci_identity_and_ultimate_plan() {
        let record = build_license_record(date(2022, 6, 1));
        let keys: Vec<_> = record.licensee.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Name", "Company", "Email"]);
        assert_eq!(record.licensee_name(), Some("python-gitlab-ci"));
        assert_eq!(record.licensee["Company"], "python-gitlab-ci");
        assert_eq!(record.licensee["Email"], "python-gitlab-ci@example.com");
        assert_eq!(record.restrictions.plan, Plan::Ultimate);
        assert_eq!(record.version, 1);
    }

    #[test]
    fn license_id_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(42);
        let template = LicenseTemplate::default();
        for _ in 0..1000 {
            let id = template.build(date(2022, 6, 1), &mut rng).restrictions.id;
            assert!((1000..=99_999_999).contains(&id), "id out of range: {id}");
        }
    }

    #[test]
    fn serialized_payload_uses_gitlab_keys() {
        let mut rng = StdRng::seed_from_u64(7);
        let record = LicenseTemplate::default().build(date(2022, 6, 1), &mut rng);
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["issued_at"], "2022-06-01");
        assert_eq!(value["expires_at"], "2022-06-03");
        assert_eq!(value["restrictions"]["plan"], "ultimate");
        assert_eq!(value["licensee"]["Name"], "python-gitlab-ci");
        assert!(value.get("starts_at").is_none());
        assert!(value.get("notify_admins_at").is_none());
        assert!(value["restrictions"].get("active_user_count").is_none());
    }

    #[test]
    fn active_user_count_is_carried_when_set() {
        let template = LicenseTemplate {
            active_user_count: Some(100),
            ..LicenseTemplate::default()
        };
        let record = template.build(date(2022, 6, 1), &mut rand::thread_rng());
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["restrictions"]["active_user_count"], 100);
    }

    #[test]
    fn validate_rejects_equal_dates() {
        let mut record = build_license_record(date(2022, 6, 1));
        record.expires_at = record.starts_at;
        let err = record.validate().unwrap_err();
        assert!(matches!(err, LicenseError::Validation(_)));
        assert!(err.to_string().contains("expires_at"), "got: {err}");
    }

    #[test]
    fn validate_rejects_empty_licensee() {
        let mut record = build_license_record(date(2022, 6, 1));
        record.licensee.clear();
        assert!(matches!(record.validate(), Err(LicenseError::Validation(_))));
    }

    #[test]
    fn validate_rejects_unknown_version() {
        let mut record = build_license_record(date(2022, 6, 1));
        record.version = 2;
        assert!(matches!(record.validate(), Err(LicenseError::Validation(_))));
    }

    #[test]
    fn export_rejects_equal_dates_before_sealing() {
        let mut record = build_license_record(date(2022, 6, 1));
        record.expires_at = record.starts_at;
        let err = export(&record, test_key_pair().private_key()).unwrap_err();
        assert!(matches!(err, LicenseError::Validation(_)));
    }

    #[test]
    fn export_then_import_round_trips() {
        let pair = test_key_pair();
        let record = build_license_record(date(2022, 6, 1));

        let artifact = export(&record, pair.private_key()).unwrap();
        assert!(!artifact.is_empty());

        let imported = import(&artifact, pair.public_key()).unwrap();
        assert_eq!(imported, record);
    }

    #[test]
    fn expiry_status_over_the_window() {
        let record = build_license_record(date(2022, 6, 1));
        assert_eq!(
            record.expiry_status(date(2022, 5, 30)),
            ExpiryStatus::NotYetValid { days: 2 }
        );
        assert_eq!(record.expiry_status(date(2022, 6, 1)), ExpiryStatus::Valid { days: 2 });
        assert_eq!(
            record.expiry_status(date(2022, 6, 2)),
            ExpiryStatus::ExpiringSoon { days: 1 }
        );
        assert_eq!(record.expiry_status(date(2022, 6, 3)), ExpiryStatus::Expired);
        assert_eq!(record.expiry_status(date(2023, 1, 1)), ExpiryStatus::Expired);
    }

    #[test]
    fn plan_parses_case_insensitively() {
        assert_eq!("Ultimate".parse::<Plan>().unwrap(), Plan::Ultimate);
        assert_eq!(" premium ".parse::<Plan>().unwrap(), Plan::Premium);
        let err = "gold".parse::<Plan>().unwrap_err();
        assert!(err.contains("unsupported plan"));
    }

    #[test]
    fn plan_display_matches_serde() {
        for plan in [Plan::Starter, Plan::Premium, Plan::Ultimate] {
            let json = serde_json::to_string(&plan).unwrap();
            assert_eq!(json, format!("\"{plan}\""));
        }
    }
}
