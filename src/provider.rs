//! Input providers for public keys, oil vectors and run configuration

use crate::attack::RecoveryConfig;
use crate::error::{RecoveryError, Result};
use crate::key::{Parameters, PublicKey};
use crate::math::{field_elements_to_hex, parse_field_elements_hex, Gf256, Matrix, Vector};
use serde::{Deserialize, Serialize};
use std::io::{self, Read};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Format {
    Json,
    Text,
}

/// Entry order of a text dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    /// pqov expanded key: the vinegar block `P1`, the mixed block `P2` and
    /// the oil block `P3`, each upper-triangular row-major with the `m`
    /// forms interleaved per entry.
    #[default]
    Expanded,
    /// Upper triangle of the full `n×n` matrices, row-major, `m` forms
    /// interleaved per entry.
    Flat,
}

/// `{ "v": .., "m": .., "matrices": [[row hex, ..], ..] }`
#[derive(Debug, Serialize, Deserialize)]
pub struct PublicKeyDocument {
    pub v: usize,
    pub m: usize,
    pub matrices: Vec<Vec<String>>,
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        Ok(std::fs::read_to_string(input)?)
    }
}

/// Loads a public key from a path, or stdin for `-`.
///
/// JSON documents carry their own parameters; `params`, when given, must
/// agree with them. Text dumps need `params` and default to uov-Ip.
pub fn load_public_key(
    input: &str,
    params: Option<Parameters>,
    layout: Layout,
) -> Result<PublicKey> {
    let content = read_input(input)?;
    parse_public_key(&content, params, layout)
}

pub fn parse_public_key(
    content: &str,
    params: Option<Parameters>,
    layout: Layout,
) -> Result<PublicKey> {
    match detect_format(content)? {
        Format::Json => parse_json(content, params),
        Format::Text => parse_text(content, params.unwrap_or(Parameters::UOV_IP), layout),
    }
}

const BOM: &str = "\u{FEFF}";

fn strip_bom(content: &str) -> &str {
    content.strip_prefix(BOM).unwrap_or(content)
}

pub fn detect_format(content: &str) -> Result<Format> {
    let trimmed = strip_bom(content).trim_start();

    if trimmed.starts_with('{') {
        return Ok(Format::Json);
    }

    let first = trimmed.split(is_separator).find(|t| !t.is_empty());
    if first.is_some_and(|t| parse_byte(t).is_ok()) {
        return Ok(Format::Text);
    }

    Err(RecoveryError::MalformedPublicKey(
        "unable to detect format, expected a JSON document or comma-separated hex bytes".into(),
    ))
}

fn parse_json(content: &str, params: Option<Parameters>) -> Result<PublicKey> {
    let doc: PublicKeyDocument = serde_json::from_str(strip_bom(content))
        .map_err(|e| RecoveryError::MalformedPublicKey(format!("invalid JSON: {e}")))?;
    let declared = Parameters::new(doc.v, doc.m)
        .map_err(|e| RecoveryError::MalformedPublicKey(e.to_string()))?;
    if let Some(p) = params {
        if p != declared {
            return Err(RecoveryError::MalformedPublicKey(format!(
                "key declares v={}, m={} but v={}, m={} was requested",
                doc.v, doc.m, p.v, p.m
            )));
        }
    }

    let n = declared.n;
    let matrices = doc
        .matrices
        .iter()
        .enumerate()
        .map(|(k, rows)| {
            if rows.len() != n {
                return Err(RecoveryError::MalformedPublicKey(format!(
                    "matrix {k} has {} rows, expected {n}",
                    rows.len()
                )));
            }
            let rows = rows
                .iter()
                .map(|r| parse_field_elements_hex(r))
                .collect::<Result<Vec<_>>>()
                .map_err(|e| RecoveryError::MalformedPublicKey(format!("matrix {k}: {e}")))?;
            if let Some(bad) = rows.iter().find(|r| r.len() != n) {
                return Err(RecoveryError::MalformedPublicKey(format!(
                    "matrix {k} has a row of {} entries, expected {n}",
                    bad.len()
                )));
            }
            Matrix::from_rows(&rows)
        })
        .collect::<Result<Vec<_>>>()?;

    PublicKey::new(declared, matrices)
}

fn is_separator(c: char) -> bool {
    c == ',' || c.is_whitespace()
}

fn parse_byte(token: &str) -> std::result::Result<u8, std::num::ParseIntError> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    u8::from_str_radix(digits, 16)
}

fn parse_text(content: &str, params: Parameters, layout: Layout) -> Result<PublicKey> {
    let entries = strip_bom(content)
        .split(is_separator)
        .filter(|t| !t.is_empty())
        .map(|t| {
            parse_byte(t)
                .map(Gf256::new)
                .map_err(|e| RecoveryError::MalformedPublicKey(format!("bad entry {t:?}: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;

    let (v, m, n) = (params.v, params.m, params.n);
    let expected = m * n * (n + 1) / 2;
    if entries.len() != expected {
        return Err(RecoveryError::MalformedPublicKey(format!(
            "expected {expected} entries for v={v}, m={m}, got {}",
            entries.len()
        )));
    }

    let flat = match layout {
        Layout::Flat => entries,
        Layout::Expanded => interleave_expanded(&entries, v, m),
    };

    let mut matrices = vec![Matrix::zeros(n, n); m];
    let mut values = flat.into_iter();
    for i in 0..n {
        for j in i..n {
            for p in matrices.iter_mut() {
                p.set(i, j, values.next().unwrap_or_default());
            }
        }
    }
    PublicKey::new(params, matrices)
}

/// Reorders `P1 ‖ P2 ‖ P3` into the flat upper-triangle order: for each
/// vinegar row `i`, the `P1` entries `(i, i..v)` followed by the `P2`
/// entries `(i, v..n)`, and finally `P3`.
fn interleave_expanded(entries: &[Gf256], v: usize, m: usize) -> Vec<Gf256> {
    let p1_len = m * v * (v + 1) / 2;
    let p2_len = m * v * m;
    let (p1, rest) = entries.split_at(p1_len);
    let (p2, p3) = rest.split_at(p2_len);

    let mut out = Vec::with_capacity(entries.len());
    let mut offset = 0;
    for i in 0..v {
        let row = (v - i) * m;
        out.extend_from_slice(&p1[offset..offset + row]);
        out.extend_from_slice(&p2[i * m * m..(i + 1) * m * m]);
        offset += row;
    }
    out.extend_from_slice(p3);
    out
}

/// Serializes a key in the JSON document format.
pub fn public_key_to_json(key: &PublicKey) -> Result<String> {
    let params = key.params();
    let doc = PublicKeyDocument {
        v: params.v,
        m: params.m,
        matrices: key
            .matrices()
            .iter()
            .map(|p| p.to_rows().iter().map(|r| field_elements_to_hex(r)).collect())
            .collect(),
    };
    serde_json::to_string_pretty(&doc).map_err(|e| RecoveryError::InvalidEncoding(e.to_string()))
}

/// Decodes an oil vector given as hex or as the path of a file holding hex.
pub fn decode_oil_vector(hex_or_path: &str, n: usize) -> Result<Vector> {
    let path = Path::new(hex_or_path);
    let text = if path.is_file() {
        std::fs::read_to_string(path)?
    } else {
        hex_or_path.to_string()
    };
    let vector = parse_field_elements_hex(&text)?;
    if vector.len() != n {
        return Err(RecoveryError::InvalidEncoding(format!(
            "oil vector has {} field elements, expected {n}",
            vector.len()
        )));
    }
    Ok(vector)
}

pub fn encode_vector(vector: &[Gf256]) -> String {
    field_elements_to_hex(vector)
}

/// Reads a JSON [`RecoveryConfig`]; missing fields keep their defaults.
pub fn load_config(path: &str) -> Result<RecoveryConfig> {
    let content = read_input(path)?;
    serde_json::from_str(&content)
        .map_err(|e| RecoveryError::InvalidEncoding(format!("config {path}: {e}")))
}
