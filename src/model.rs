//! Extracted invoice data and the tagged edits that mutate it.
//!
//! The JSON field names (`invoiceDate`, `unitPrice`, …) are the ones the
//! model is asked to produce in [`crate::prompts::invoice_schema`], so the
//! same types serve for parsing replies and for `--json` output.

use serde::{Deserialize, Serialize};

/// One row of the invoice's item table.
///
/// `total` is taken verbatim from the document and never recomputed from
/// `quantity * unit_price`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub total: f64,
}

impl LineItem {
    pub fn new(description: impl Into<String>, quantity: f64, unit_price: f64, total: f64) -> Self {
        Self {
            description: description.into(),
            quantity,
            unit_price,
            total,
        }
    }

    /// Apply one field change.
    pub fn apply(&mut self, edit: LineItemEdit) {
        match edit {
            LineItemEdit::Description(v) => self.description = v,
            LineItemEdit::Quantity(v) => self.quantity = v,
            LineItemEdit::UnitPrice(v) => self.unit_price = v,
            LineItemEdit::Total(v) => self.total = v,
        }
    }
}

/// Structured fields extracted from one invoice.
///
/// `po_number`, `quotation_number` and `currency` are empty strings when the
/// document has none; the model is told to emit `""` but replies that omit
/// the keys are accepted too.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceData {
    pub invoice_date: String,
    pub invoice_number: String,
    #[serde(default)]
    pub po_number: String,
    #[serde(default)]
    pub quotation_number: String,
    pub total_amount: f64,
    #[serde(default)]
    pub currency: String,
    pub items: Vec<LineItem>,
}

/// A single-field change to a [`LineItem`].
#[derive(Debug, Clone, PartialEq)]
pub enum LineItemEdit {
    Description(String),
    Quantity(f64),
    UnitPrice(f64),
    Total(f64),
}

/// A single change to an [`InvoiceData`], as produced by an editing front-end.
#[derive(Debug, Clone, PartialEq)]
pub enum InvoiceEdit {
    InvoiceDate(String),
    InvoiceNumber(String),
    PoNumber(String),
    QuotationNumber(String),
    Currency(String),
    TotalAmount(f64),
    /// Change one field of the item at `index`.
    Item { index: usize, edit: LineItemEdit },
    /// Append an item.
    AddItem(LineItem),
    /// Remove the item at `index`.
    RemoveItem(usize),
}

impl InvoiceData {
    /// Apply an edit in place.
    ///
    /// Returns a description of the problem when an item index is out of
    /// range; the data is left unchanged in that case.
    pub fn apply(&mut self, edit: InvoiceEdit) -> Result<(), String> {
        match edit {
            InvoiceEdit::InvoiceDate(v) => self.invoice_date = v,
            InvoiceEdit::InvoiceNumber(v) => self.invoice_number = v,
            InvoiceEdit::PoNumber(v) => self.po_number = v,
            InvoiceEdit::QuotationNumber(v) => self.quotation_number = v,
            InvoiceEdit::Currency(v) => self.currency = v,
            InvoiceEdit::TotalAmount(v) => self.total_amount = v,
            InvoiceEdit::Item { index, edit } => {
                let len = self.items.len();
                let item = self
                    .items
                    .get_mut(index)
                    .ok_or_else(|| format!("item {index} out of range ({len} items)"))?;
                item.apply(edit);
            }
            InvoiceEdit::AddItem(item) => self.items.push(item),
            InvoiceEdit::RemoveItem(index) => {
                if index >= self.items.len() {
                    return Err(format!(
                        "item {index} out of range ({} items)",
                        self.items.len()
                    ));
                }
                self.items.remove(index);
            }
        }
        Ok(())
    }
}
