//! Accounting (Tally) payloads forwarded to the cloud.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A voucher as exported by Tally. Missing elements stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Voucher {
    pub date: Option<String>,
    #[serde(rename = "type")]
    pub voucher_type: Option<String>,
    pub amount: Option<String>,
    pub narration: Option<String>,
}

/// Ledgers and vouchers of one company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CompanyRecord {
    pub company: String,
    pub ledgers: Vec<String>,
    pub vouchers: Vec<Voucher>,
}

/// Body POSTed to the cloud's Tally receiver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TallyPayload {
    pub records: Vec<CompanyRecord>,
}

impl From<Vec<CompanyRecord>> for TallyPayload {
    fn from(records: Vec<CompanyRecord>) -> Self {
        Self { records }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voucher_type_field_name() {
        let voucher = Voucher {
            voucher_type: Some("Sales".into()),
            ..Default::default()
        };
        let json = serde_json::to_value(&voucher).unwrap();
        assert_eq!(json["type"], "Sales");
        assert!(json["date"].is_null());
    }
}
