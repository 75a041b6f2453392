//! Indicator extraction task.
//!
//! Scans the ransom note field and writes the extracted indicators back to
//! the incident's list fields.

use async_trait::async_trait;
use rampart_core::fields::schema::names;
use rampart_core::indicators::{IndicatorExtractor, IndicatorKind};
use rampart_core::registry::{TaskContext, TaskError, TaskHandler, TaskReport};
use rampart_core::playbook::ransomware::actions;
use tracing::{debug, info, instrument};

/// Extracts indicators from a free-text field into the structured
/// indicator list fields.
pub struct ExtractIndicatorsHandler {
    extractor: IndicatorExtractor,
}

impl ExtractIndicatorsHandler {
    /// Creates a handler with the default format catalog.
    pub fn new() -> Self {
        Self {
            extractor: IndicatorExtractor::new(),
        }
    }

    /// Creates a handler with a custom extractor.
    pub fn with_extractor(extractor: IndicatorExtractor) -> Self {
        Self { extractor }
    }
}

impl Default for ExtractIndicatorsHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskHandler for ExtractIndicatorsHandler {
    fn name(&self) -> &str {
        actions::EXTRACT_INDICATORS
    }

    fn description(&self) -> &str {
        "Scans the ransom note for cryptocurrency addresses, onion URLs and emails"
    }

    #[instrument(skip(self, ctx), fields(task_id = %ctx.task_id))]
    async fn run(&self, ctx: TaskContext) -> Result<TaskReport, TaskError> {
        let source_field = ctx.get_str("source_field").unwrap_or(names::RANSOM_NOTE);
        let writer = ctx.writer();

        let text = match ctx.fields.get(source_field)? {
            Some(value) => value.as_str().map(str::to_string).unwrap_or_default(),
            None => {
                debug!(field = source_field, "no text to scan");
                return Ok(TaskReport::message("no note text present; nothing to scan")
                    .with_output("indicators", serde_json::json!(0)));
            }
        };

        let mut addresses = 0usize;
        let mut onions = 0usize;
        let mut emails = 0usize;
        for indicator in self.extractor.scan(&text) {
            match &indicator.kind {
                IndicatorKind::CryptoAddress(address_type) => {
                    ctx.fields
                        .append_string(names::CRYPTO_ADDRESS, &indicator.value, &writer)?;
                    ctx.fields
                        .append_string(names::CRYPTO_ADDRESS_TYPE, address_type, &writer)?;
                    addresses += 1;
                }
                IndicatorKind::OnionAddress => {
                    ctx.fields
                        .append_string(names::ONION_ADDRESS, &indicator.value, &writer)?;
                    onions += 1;
                }
                IndicatorKind::Email => {
                    ctx.fields
                        .append_string(names::EMAIL, &indicator.value, &writer)?;
                    emails += 1;
                }
            }
        }

        info!(addresses, onions, emails, "indicator scan complete");
        Ok(TaskReport::message(format!(
            "extracted {addresses} address(es), {onions} onion URL(s), {emails} email(s)"
        ))
        .with_output("crypto_addresses", serde_json::json!(addresses))
        .with_output("onion_addresses", serde_json::json!(onions))
        .with_output("emails", serde_json::json!(emails)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rampart_core::fields::{ransomware_schema, FieldStore, FieldValue};
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    fn context(fields: Arc<FieldStore>) -> TaskContext {
        TaskContext {
            incident_id: Uuid::new_v4(),
            task_id: "scan".to_string(),
            parameters: serde_json::Value::Null,
            fields,
            connector_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_extracts_note_indicators_into_fields() {
        let fields = Arc::new(FieldStore::new(ransomware_schema()));
        fields
            .set(
                names::RANSOM_NOTE,
                FieldValue::text(
                    "All your files are encrypted. Send 2 BTC to \
                     1BoatSLRHtKNngkdXEeobR76b53LETtpyT and visit \
                     http://exampleoniontoorurlabc234.onion or contact \
                     unlock@evil.example",
                ),
                "intake",
            )
            .unwrap();

        let handler = ExtractIndicatorsHandler::new();
        let report = handler.run(context(Arc::clone(&fields))).await.unwrap();
        assert_eq!(report.output["crypto_addresses"], serde_json::json!(1));
        assert_eq!(report.output["onion_addresses"], serde_json::json!(1));
        assert_eq!(report.output["emails"], serde_json::json!(1));

        let addresses = fields.get(names::CRYPTO_ADDRESS).unwrap().unwrap();
        assert_eq!(
            addresses.as_string_list().unwrap(),
            ["1BoatSLRHtKNngkdXEeobR76b53LETtpyT"]
        );
        let types = fields.get(names::CRYPTO_ADDRESS_TYPE).unwrap().unwrap();
        assert_eq!(types.as_string_list().unwrap(), ["bitcoin"]);
    }

    #[tokio::test]
    async fn test_missing_note_succeeds_with_nothing() {
        let fields = Arc::new(FieldStore::new(ransomware_schema()));
        let handler = ExtractIndicatorsHandler::new();

        let report = handler.run(context(Arc::clone(&fields))).await.unwrap();
        assert_eq!(report.output["indicators"], serde_json::json!(0));
        assert_eq!(fields.get(names::CRYPTO_ADDRESS).unwrap(), None);
    }

    #[tokio::test]
    async fn test_rescan_is_idempotent() {
        let fields = Arc::new(FieldStore::new(ransomware_schema()));
        fields
            .set(
                names::RANSOM_NOTE,
                FieldValue::text("pay 1BoatSLRHtKNngkdXEeobR76b53LETtpyT"),
                "intake",
            )
            .unwrap();

        let handler = ExtractIndicatorsHandler::new();
        handler.run(context(Arc::clone(&fields))).await.unwrap();
        handler.run(context(Arc::clone(&fields))).await.unwrap();

        let addresses = fields.get(names::CRYPTO_ADDRESS).unwrap().unwrap();
        assert_eq!(addresses.as_string_list().unwrap().len(), 1);
    }
}
