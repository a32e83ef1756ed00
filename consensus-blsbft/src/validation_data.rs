//! Codec for the validation payload embedded in a block.
//!
//! The block type belongs to the chain collaborator and only exposes an
//! opaque string field, so the structured [`ValidationData`] crosses that
//! boundary as a JSON document with every byte field in standard base64.
//! The string arrives from the network inside peer blocks; [`decode`] never
//! panics and rejects anything it cannot fully account for.

use {
    crate::error::{ConsensusError, Result},
    serde::{Deserialize, Serialize},
};

/// Signatures attached to a block by its producer and, once committed, by
/// the quorum of voters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationData {
    #[serde(with = "base64_bytes")]
    pub producer_main_sig: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub producer_aux_sig: Vec<u8>,
    /// Committee indices of the voters, ascending.
    pub contributor_indices: Vec<usize>,
    #[serde(with = "base64_bytes")]
    pub aggregate_main_sig: Vec<u8>,
    /// One entry per contributor, parallel to `contributor_indices`.
    #[serde(with = "base64_list")]
    pub aggregate_aux_sigs: Vec<Vec<u8>>,
}

impl ValidationData {
    /// Validation data carrying only the producer's signatures.
    pub fn from_producer(main_sig: Vec<u8>, aux_sig: Vec<u8>) -> Self {
        Self {
            producer_main_sig: main_sig,
            producer_aux_sig: aux_sig,
            ..Self::default()
        }
    }
}

/// Encode `data` into the string stored in a block.
pub fn encode(data: &ValidationData) -> Result<String> {
    check_parallel(data).map_err(ConsensusError::EncodeValidationData)?;
    serde_json::to_string(data).map_err(|e| ConsensusError::EncodeValidationData(e.to_string()))
}

/// Decode a block's validation string.
pub fn decode(raw: &str) -> Result<ValidationData> {
    if raw.trim().is_empty() {
        return Err(ConsensusError::DecodeValidationData(
            "empty validation data".to_string(),
        ));
    }
    let data: ValidationData = serde_json::from_str(raw)
        .map_err(|e| ConsensusError::DecodeValidationData(e.to_string()))?;
    check_parallel(&data).map_err(ConsensusError::DecodeValidationData)?;
    Ok(data)
}

fn check_parallel(data: &ValidationData) -> std::result::Result<(), String> {
    if data.aggregate_aux_sigs.len() != data.contributor_indices.len() {
        return Err(format!(
            "{} aux signatures for {} contributors",
            data.aggregate_aux_sigs.len(),
            data.contributor_indices.len()
        ));
    }
    Ok(())
}

mod base64_bytes {
    use {
        base64::{engine::general_purpose::STANDARD, Engine as _},
        serde::{de::Error as _, Deserialize, Deserializer, Serializer},
    };

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(D::Error::custom)
    }
}

mod base64_list {
    use {
        base64::{engine::general_purpose::STANDARD, Engine as _},
        serde::{de::Error as _, ser::SerializeSeq, Deserialize, Deserializer, Serializer},
    };

    pub fn serialize<S: Serializer>(items: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for item in items {
            seq.serialize_element(&STANDARD.encode(item))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .into_iter()
            .map(|s| STANDARD.decode(s).map_err(D::Error::custom))
            .collect()
    }
}
