use serde::{Deserialize, Serialize};

/// Caller-supplied identifier a session is registered under.
pub type SessionToken = String;

/// A registered session, stored as one flat JSON document.
///
/// The wire shape uses camelCase field names:
/// `userId`, `needFullUrl`, `ipAddress`, `portListen`, `lessonShortName`,
/// `containerId`, `token` and, when a lease is set, `expiresAtMs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    // Identity
    pub user_id: i64,
    pub token: SessionToken,

    // Routing
    pub need_full_url: bool,
    pub ip_address: String,
    pub port_listen: u16,

    // Workload
    pub lesson_short_name: String,
    pub container_id: String,

    // Lease
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<u64>,
}

impl Session {
    /// Returns true if the session has an expiry set and we have passed it.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        match self.expires_at_ms {
            Some(expiry) => now_ms >= expiry,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_session() -> Session {
        Session {
            user_id: 1,
            token: "key".into(),
            need_full_url: false,
            ip_address: "127.0.0.1".into(),
            port_listen: 8000,
            lesson_short_name: "fake-lesson".into(),
            container_id: "0123456789".into(),
            expires_at_ms: None,
        }
    }

    #[test]
    fn serializes_to_flat_camel_case_document() {
        let value = serde_json::to_value(sample_session()).unwrap();

        assert_eq!(
            value,
            json!({
                "userId": 1,
                "token": "key",
                "needFullUrl": false,
                "ipAddress": "127.0.0.1",
                "portListen": 8000,
                "lessonShortName": "fake-lesson",
                "containerId": "0123456789"
            })
        );
    }

    #[test]
    fn lease_field_is_written_only_when_set() {
        let mut s = sample_session();
        s.expires_at_ms = Some(5_000);

        let value = serde_json::to_value(&s).unwrap();
        assert_eq!(value["expiresAtMs"], json!(5_000));
    }

    #[test]
    fn documents_without_lease_parse() {
        let doc = r#"{"userId":7,"needFullUrl":true,"ipAddress":"10.0.0.2","portListen":9000,
            "lessonShortName":"L","containerId":"c1","token":"t1"}"#;

        let s: Session = serde_json::from_str(doc).unwrap();
        assert_eq!(s.user_id, 7);
        assert!(s.need_full_url);
        assert_eq!(s.expires_at_ms, None);
    }

    #[test]
    fn negative_user_id_is_accepted() {
        let doc = r#"{"userId":-1,"needFullUrl":false,"ipAddress":"10.0.0.2","portListen":9000,
            "lessonShortName":"L","containerId":"c1","token":"t1"}"#;

        let s: Session = serde_json::from_str(doc).unwrap();
        assert_eq!(s.user_id, -1);
    }

    #[test]
    fn missing_fields_are_rejected() {
        let doc = r#"{"userId":7,"token":"t1"}"#;
        assert!(serde_json::from_str::<Session>(doc).is_err());
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let mut s = sample_session();
        assert!(!s.is_expired(u64::MAX));

        s.expires_at_ms = Some(1_000);
        assert!(!s.is_expired(999));
        assert!(s.is_expired(1_000));
        assert!(s.is_expired(1_001));
    }
}
