//! Protocolo de comunicação.
//!
//! Cada frame de texto do WebSocket carrega um objeto JSON:
//!
//! ```text
//! {"cpu": 41.5, "memory": 63.0, "disk": 80.2, "network": 1234.5, "timestamp": 1718000000000}
//! ```
//!
//! A decodificação é apenas estrutural: os cinco campos precisam existir e ter
//! o tipo certo (`timestamp` inteiro). Campos extras são ignorados e nenhuma
//! faixa de valores é verificada.

use crate::types::Sample;

/// Tamanho máximo aceito para um payload (64 KiB).
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024;

/// Erros de decodificação de payload.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Payload vazio")]
    Empty,

    #[error("Payload muito grande ({0} bytes, máximo {MAX_PAYLOAD_BYTES})")]
    TooLarge(usize),

    #[error("Payload malformado: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Decodifica um payload bruto em [`Sample`].
pub fn decode_sample(raw: &[u8]) -> Result<Sample, DecodeError> {
    if raw.len() > MAX_PAYLOAD_BYTES {
        return Err(DecodeError::TooLarge(raw.len()));
    }
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(DecodeError::Empty);
    }

    Ok(serde_json::from_slice(raw)?)
}

/// Serializa uma [`Sample`] no formato do frame.
pub fn encode_sample(sample: &Sample) -> Result<String, serde_json::Error> {
    serde_json::to_string(sample)
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_well_formed_payload() {
        let raw = br#"{"cpu":45.5,"memory":68,"disk":82.1,"network":124.0,"timestamp":1718000000000}"#;
        let sample = decode_sample(raw).unwrap();
        assert_eq!(sample.cpu, 45.5);
        assert_eq!(sample.memory, 68.0);
        assert_eq!(sample.disk, 82.1);
        assert_eq!(sample.network, 124.0);
        assert_eq!(sample.timestamp, 1_718_000_000_000);
    }

    #[test]
    fn rejects_wrong_field_type() {
        let err = decode_sample(br#"{"cpu":40,"memory":"bad"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn rejects_missing_field() {
        let raw = br#"{"cpu":40,"memory":50,"disk":60,"timestamp":1}"#;
        assert!(matches!(decode_sample(raw), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn rejects_fractional_timestamp() {
        let raw = br#"{"cpu":1,"memory":2,"disk":3,"network":4,"timestamp":1.5}"#;
        assert!(decode_sample(raw).is_err());
    }

    #[test]
    fn rejects_non_object() {
        assert!(decode_sample(b"[1,2,3]").is_err());
        assert!(decode_sample(b"not json").is_err());
    }

    #[test]
    fn rejects_empty_payload() {
        assert!(matches!(decode_sample(b""), Err(DecodeError::Empty)));
        assert!(matches!(decode_sample(b"  \n"), Err(DecodeError::Empty)));
    }

    #[test]
    fn rejects_oversized_payload() {
        let raw = vec![b' '; MAX_PAYLOAD_BYTES + 1];
        assert!(matches!(decode_sample(&raw), Err(DecodeError::TooLarge(_))));
    }

    #[test]
    fn accepts_out_of_range_values_and_extra_fields() {
        let raw = br#"{"cpu":140,"memory":-3,"disk":0,"network":0,"timestamp":0,"host":"a"}"#;
        let sample = decode_sample(raw).unwrap();
        assert_eq!(sample.cpu, 140.0);
        assert_eq!(sample.memory, -3.0);
    }

    #[test]
    fn encoded_frame_is_decodable() {
        let sample = Sample {
            cpu: 10.0,
            memory: 20.0,
            disk: 30.0,
            network: 40.0,
            timestamp: 99,
        };
        let frame = encode_sample(&sample).unwrap();
        assert!(frame.contains("\"timestamp\":99"));
        assert_eq!(decode_sample(frame.as_bytes()).unwrap(), sample);
    }
}
