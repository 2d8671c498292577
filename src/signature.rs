//! Model signature: a structured description of a model's input and output
//! columns or tensors. Each side carries exactly one representation.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Signature {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inputs: Option<SignatureSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predictions: Option<SignatureSpec>,
}

impl Signature {
    pub fn new(inputs: Option<SignatureSpec>, predictions: Option<SignatureSpec>) -> Self {
        Self { inputs, predictions }
    }
}

/// Closed set of per-side representations. The externally tagged encoding
/// yields `{"columnarSpec": ...}` / `{"tensorSpec": ...}` on the wire, so a
/// side can never carry both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SignatureSpec {
    ColumnarSpec(Vec<Column>),
    TensorSpec(TensorSpec),
}

impl SignatureSpec {
    /// Columnar spec from ordered (name, type-tag) pairs, e.g. a tabular
    /// structure's column names and dtypes.
    pub fn columnar<N, T>(columns: impl IntoIterator<Item = (N, T)>) -> Self
    where
        N: Into<String>,
        T: Into<String>,
    {
        SignatureSpec::ColumnarSpec(
            columns
                .into_iter()
                .map(|(name, data_type)| Column {
                    name: name.into(),
                    data_type: data_type.into(),
                })
                .collect(),
        )
    }

    pub fn tensor(shape: Vec<i64>, data_type: impl Into<String>) -> Self {
        SignatureSpec::TensorSpec(TensorSpec {
            shape,
            data_type: data_type.into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TensorSpec {
    pub shape: Vec<i64>,
    pub data_type: String,
}
