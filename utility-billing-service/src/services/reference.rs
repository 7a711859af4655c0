use chrono::{DateTime, Utc};
use rand::Rng;

pub const TICKET_REFERENCE_PREFIX: &str = "TKT";

/// Produces `TKT-<epoch millis>-<3 digit random suffix>`. Uniqueness
/// against the store is checked by the caller.
#[derive(Debug, Clone, Default)]
pub struct TicketReferenceGenerator;

impl TicketReferenceGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(&self) -> String {
        self.generate_at(Utc::now())
    }

    pub fn generate_at(&self, now: DateTime<Utc>) -> String {
        let suffix: u16 = rand::thread_rng().gen_range(0..1000);
        format!(
            "{}-{}-{:03}",
            TICKET_REFERENCE_PREFIX,
            now.timestamp_millis(),
            suffix
        )
    }

    pub fn is_valid(reference: &str) -> bool {
        let mut parts = reference.split('-');
        matches!(
            (parts.next(), parts.next(), parts.next(), parts.next()),
            (Some(TICKET_REFERENCE_PREFIX), Some(millis), Some(suffix), None)
                if millis.len() == 13
                    && millis.bytes().all(|b| b.is_ascii_digit())
                    && suffix.len() == 3
                    && suffix.bytes().all(|b| b.is_ascii_digit())
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_reference_format() {
        let now = Utc.timestamp_millis_opt(1_732_000_000_000).unwrap();
        let reference = TicketReferenceGenerator::new().generate_at(now);

        assert!(reference.starts_with("TKT-1732000000000-"));
        assert!(TicketReferenceGenerator::is_valid(&reference));
    }

    #[test]
    fn test_generated_references_are_valid() {
        let generator = TicketReferenceGenerator::new();
        for _ in 0..50 {
            assert!(TicketReferenceGenerator::is_valid(&generator.generate()));
        }
    }

    #[test]
    fn test_is_valid_rejects_malformed() {
        assert!(TicketReferenceGenerator::is_valid("TKT-1732000000000-042"));
        assert!(!TicketReferenceGenerator::is_valid("TKT-1732000000000-42"));
        assert!(!TicketReferenceGenerator::is_valid("REF-1732000000000-042"));
        assert!(!TicketReferenceGenerator::is_valid("TKT-173200000000a-042"));
        assert!(!TicketReferenceGenerator::is_valid("TKT-1732000000000-042-1"));
    }
}
