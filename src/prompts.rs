//! Prompts and the output schema for invoice extraction.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — changing which fields are requested or how
//!    dates are normalised requires editing exactly one place.
//!
//! 2. **Testability** — unit tests can inspect prompts and the schema directly
//!    without spinning up a real VLM.
//!
//! Callers can override the instruction texts via
//! [`crate::config::ExtractionConfig`]; the schema is fixed because the
//! parser in [`crate::pipeline::extract`] depends on its shape.

use serde_json::{json, Value};

/// Default system instruction: numeric precision and date normalisation.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a meticulous accounts-payable assistant that reads invoices.

Rules:
- Copy every number exactly as printed. Do not round, do not recompute totals.
- Write numbers as plain JSON numbers without currency symbols or thousands separators.
- Normalise every date to the format YYYY-MM-DD.
- Use the ISO 4217 code for the currency (e.g. USD, EUR, THB) when it can be determined.
- Never invent values that are not on the document."#;

/// Default extraction instruction sent alongside the document.
pub const DEFAULT_EXTRACTION_PROMPT: &str = r#"Extract the following fields from this invoice:

- invoiceDate: the invoice issue date
- invoiceNumber: the invoice number
- poNumber: the purchase order number, or "" if there is none
- quotationNumber: the quotation / quote reference number, or "" if there is none
- totalAmount: the grand total payable
- currency: the currency of the amounts
- items: every line item, each with description, quantity, unitPrice and total

Respond with a single JSON object that matches the schema below and nothing else."#;

/// JSON schema the model's reply must follow.
///
/// `poNumber` and `quotationNumber` are deliberately not `required`: the
/// instruction asks for `""` instead, and the parser defaults them.
pub fn invoice_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "invoiceDate": { "type": "string" },
            "invoiceNumber": { "type": "string" },
            "poNumber": { "type": "string" },
            "quotationNumber": { "type": "string" },
            "totalAmount": { "type": "number" },
            "currency": { "type": "string" },
            "items": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "description": { "type": "string" },
                        "quantity": { "type": "number" },
                        "unitPrice": { "type": "number" },
                        "total": { "type": "number" }
                    },
                    "required": ["description", "quantity", "unitPrice", "total"]
                }
            }
        },
        "required": ["invoiceDate", "invoiceNumber", "totalAmount", "items"]
    })
}

/// Combine the extraction instruction with the pretty-printed schema.
pub fn extraction_request_text(instruction: &str) -> String {
    let schema = serde_json::to_string_pretty(&invoice_schema()).unwrap_or_default();
    format!("{instruction}\n\nJSON schema:\n{schema}")
}
