//! Product-registration documents ("introduce goods" into circulation) as
//! plain values. Field names on the wire follow the registry API.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

mod date_format;
pub mod load;

pub use load::read_documents;

/// `doc_type` for goods produced in the country and put into circulation.
pub const LP_INTRODUCE_GOODS: &str = "LP_INTRODUCE_GOODS";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Description>,
    pub doc_id: String,
    pub doc_status: String,
    pub doc_type: String,
    #[serde(rename = "importRequest", default, skip_serializing_if = "Option::is_none")]
    pub import_request: Option<bool>,
    pub owner_inn: String,
    pub participant_inn: String,
    pub producer_inn: String,
    #[serde(with = "date_format")]
    pub production_date: NaiveDate,
    pub production_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub products: Option<Vec<Product>>,
    #[serde(with = "date_format")]
    pub reg_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reg_number: Option<String>,
}

impl Document {
    pub fn with_description(mut self, description: Description) -> Self {
        self.description = Some(description);
        self
    }

    pub fn with_import_request(mut self, import_request: bool) -> Self {
        self.import_request = Some(import_request);
        self
    }

    pub fn with_products(mut self, products: Vec<Product>) -> Self {
        self.products = Some(products);
        self
    }

    pub fn with_reg_number(mut self, reg_number: impl Into<String>) -> Self {
        self.reg_number = Some(reg_number.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Description {
    #[serde(rename = "participantInn")]
    pub participant_inn: String,
}

impl Description {
    pub fn new(participant_inn: impl Into<String>) -> Self {
        Self {
            participant_inn: participant_inn.into(),
        }
    }
}

/// One line item. Certificate fields and the identification codes are optional.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Product {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_document: Option<String>,
    #[serde(
        default,
        with = "date_format::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub certificate_document_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_document_number: Option<String>,
    pub owner_inn: String,
    pub producer_inn: String,
    #[serde(with = "date_format")]
    pub production_date: NaiveDate,
    pub tnved_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uit_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uitu_code: Option<String>,
}

impl Product {
    pub fn new(
        owner_inn: impl Into<String>,
        producer_inn: impl Into<String>,
        production_date: NaiveDate,
        tnved_code: impl Into<String>,
    ) -> Self {
        Self {
            certificate_document: None,
            certificate_document_date: None,
            certificate_document_number: None,
            owner_inn: owner_inn.into(),
            producer_inn: producer_inn.into(),
            production_date,
            tnved_code: tnved_code.into(),
            uit_code: None,
            uitu_code: None,
        }
    }
}
