// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Instance types and resource-based instance selection.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::{IrError, Result};

/// A machine shape offered by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstanceType {
    pub name: String,
    pub memory_mb: u64,
    pub disk_gb: u64,
    pub cpu: u32,
    #[serde(default)]
    pub gpu: bool,
    /// Relative hourly price; lower wins ties.
    #[serde(default)]
    pub price: f64,
}

/// Resources a job asks for. Unset fields are unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_gb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<bool>,
}

impl ResourceRequest {
    /// Interpret evaluated requirement values keyed by requirement name.
    pub fn from_values(values: &IndexMap<&'static str, Json>) -> Result<Self> {
        let mut request = ResourceRequest::default();
        for (key, value) in values {
            match *key {
                "instance_type" => {
                    let name = value.as_str().ok_or_else(|| IrError::InvalidRequirement {
                        key: "instance_type",
                        message: format!("expected a string, found {}", value),
                    })?;
                    request.instance_type = Some(name.to_string());
                }
                "memory" => request.memory_mb = Some(parse_memory_mb(value)?),
                "cpu" => request.cpu = Some(parse_cpu(value)?),
                "disk" => request.disk_gb = Some(parse_disk_gb(value)?),
                "gpu" => request.gpu = Some(parse_gpu(value)?),
                other => {
                    return Err(IrError::InvalidRequirement {
                        key: "requirements",
                        message: format!("unknown key '{}'", other),
                    });
                }
            }
        }
        Ok(request)
    }

    pub fn is_empty(&self) -> bool {
        *self == ResourceRequest::default()
    }
}

/// Parse a memory requirement into MiB.
///
/// Bare numbers are bytes. `KB`/`MB`/`GB`/`TB` are decimal, `K`/`KiB` and
/// friends are binary.
pub fn parse_memory_mb(value: &Json) -> Result<u64> {
    let invalid = |message: String| IrError::InvalidRequirement {
        key: "memory",
        message,
    };
    let (amount, unit) = match value {
        Json::Number(n) => (
            n.as_f64().ok_or_else(|| invalid(format!("bad number {}", n)))?,
            "B".to_string(),
        ),
        Json::String(s) => split_amount(s).ok_or_else(|| invalid(format!("cannot parse '{}'", s)))?,
        other => return Err(invalid(format!("expected a number or string, found {}", other))),
    };
    const MIB: f64 = 1024.0 * 1024.0;
    let bytes_per_unit = match unit.to_ascii_uppercase().as_str() {
        "" | "B" => 1.0,
        "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        "K" | "KIB" => 1024.0,
        "M" | "MIB" => MIB,
        "G" | "GIB" => MIB * 1024.0,
        "T" | "TIB" => MIB * 1024.0 * 1024.0,
        _ => return Err(invalid(format!("unknown unit '{}'", unit))),
    };
    let amount = non_negative(amount, value, invalid)?;
    Ok((amount * bytes_per_unit / MIB).ceil() as u64)
}

/// Parse a disk requirement into GB.
///
/// Accepts `local-disk 100 SSD`, `100 GB`, or a bare number of GB.
pub fn parse_disk_gb(value: &Json) -> Result<u64> {
    let invalid = |message: String| IrError::InvalidRequirement {
        key: "disk",
        message,
    };
    let gb = match value {
        Json::Number(n) => n.as_f64().ok_or_else(|| invalid(format!("bad number {}", n)))?,
        Json::String(s) => {
            let words: Vec<&str> = s.split_whitespace().collect();
            match words.as_slice() {
                ["local-disk", size, ..] => size
                    .parse::<f64>()
                    .map_err(|_| invalid(format!("cannot parse '{}'", s)))?,
                _ => {
                    let (amount, unit) =
                        split_amount(s).ok_or_else(|| invalid(format!("cannot parse '{}'", s)))?;
                    let scale = match unit.to_ascii_uppercase().as_str() {
                        "" | "G" | "GB" | "GIB" => 1.0,
                        "T" | "TB" | "TIB" => 1024.0,
                        "M" | "MB" | "MIB" => 1.0 / 1024.0,
                        _ => return Err(invalid(format!("unknown unit '{}'", unit))),
                    };
                    amount * scale
                }
            }
        }
        other => return Err(invalid(format!("expected a number or string, found {}", other))),
    };
    Ok(non_negative(gb, value, invalid)?.ceil() as u64)
}

/// Parse a GPU requirement: a flag, or a count where any positive count
/// asks for a GPU.
pub fn parse_gpu(value: &Json) -> Result<bool> {
    let invalid = |message: String| IrError::InvalidRequirement { key: "gpu", message };
    let count = match value {
        Json::Null => return Ok(false),
        Json::Bool(b) => return Ok(*b),
        Json::Number(n) => n.as_f64(),
        Json::String(s) if s.eq_ignore_ascii_case("true") => return Ok(true),
        Json::String(s) if s.eq_ignore_ascii_case("false") => return Ok(false),
        Json::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| invalid(format!("expected a flag or a count, found {}", value)))?;
    Ok(non_negative(count, value, invalid)? > 0.0)
}

fn non_negative(amount: f64, value: &Json, invalid: impl Fn(String) -> IrError) -> Result<f64> {
    if amount.is_finite() && amount >= 0.0 {
        Ok(amount)
    } else {
        Err(invalid(format!("must not be negative, found {}", value)))
    }
}

/// Parse a CPU count; fractional requests round up.
pub fn parse_cpu(value: &Json) -> Result<u32> {
    let amount = match value {
        Json::Number(n) => n.as_f64(),
        Json::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    amount
        .filter(|a| *a >= 0.0)
        .map(|a| a.ceil() as u32)
        .ok_or_else(|| IrError::InvalidRequirement {
            key: "cpu",
            message: format!("expected a number, found {}", value),
        })
}

fn split_amount(s: &str) -> Option<(f64, String)> {
    let s = s.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let amount = s[..split].parse::<f64>().ok()?;
    Some((amount, s[split..].trim().to_string()))
}

/// The instance types available to a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct InstanceTypeCatalog {
    types: Vec<InstanceType>,
}

impl InstanceTypeCatalog {
    pub fn new(types: Vec<InstanceType>) -> Self {
        Self { types }
    }

    pub fn get(&self, name: &str) -> Option<&InstanceType> {
        self.types.iter().find(|t| t.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstanceType> {
        self.types.iter()
    }

    /// Whether `instance` satisfies every constraint in `request`.
    pub fn satisfies(instance: &InstanceType, request: &ResourceRequest) -> bool {
        if let Some(name) = &request.instance_type {
            return &instance.name == name;
        }
        request.memory_mb.is_none_or(|m| instance.memory_mb >= m)
            && request.cpu.is_none_or(|c| instance.cpu >= c)
            && request.disk_gb.is_none_or(|d| instance.disk_gb >= d)
            && request.gpu.is_none_or(|g| !g || instance.gpu)
    }

    /// Cheapest instance satisfying `request`.
    ///
    /// An explicitly named instance type must exist in the catalog.
    pub fn choose(&self, request: &ResourceRequest) -> Result<&InstanceType> {
        if let Some(name) = &request.instance_type {
            return self
                .get(name)
                .ok_or_else(|| IrError::InstanceSelection(format!("unknown instance type '{}'", name)));
        }
        self.types
            .iter()
            .filter(|t| Self::satisfies(t, request))
            .min_by(|a, b| {
                a.price
                    .total_cmp(&b.price)
                    .then(a.memory_mb.cmp(&b.memory_mb))
                    .then(a.cpu.cmp(&b.cpu))
            })
            .ok_or_else(|| {
                IrError::InstanceSelection(
                    serde_json::to_string(request).unwrap_or_else(|_| format!("{:?}", request)),
                )
            })
    }

    /// Instance used when a task requests nothing.
    pub fn default_instance(&self) -> Result<&InstanceType> {
        self.choose(&ResourceRequest::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog() -> InstanceTypeCatalog {
        serde_json::from_value(json!([
            {"name": "small", "memoryMb": 2048, "diskGb": 20, "cpu": 1, "price": 0.1},
            {"name": "medium", "memoryMb": 8192, "diskGb": 100, "cpu": 4, "price": 0.4},
            {"name": "gpu", "memoryMb": 16384, "diskGb": 200, "cpu": 8, "gpu": true, "price": 2.0}
        ]))
        .unwrap()
    }

    #[test]
    fn test_parse_memory_units() {
        assert_eq!(parse_memory_mb(&json!("2 GiB")).unwrap(), 2048);
        assert_eq!(parse_memory_mb(&json!("2G")).unwrap(), 2048);
        assert_eq!(parse_memory_mb(&json!("1 GB")).unwrap(), 954);
        assert_eq!(parse_memory_mb(&json!(1048576)).unwrap(), 1);
        assert!(parse_memory_mb(&json!("lots")).is_err());
    }

    #[test]
    fn test_parse_disk_forms() {
        assert_eq!(parse_disk_gb(&json!("local-disk 100 SSD")).unwrap(), 100);
        assert_eq!(parse_disk_gb(&json!("50 GB")).unwrap(), 50);
        assert_eq!(parse_disk_gb(&json!(12)).unwrap(), 12);
    }

    #[test]
    fn test_negative_requirements_are_rejected() {
        for err in [
            parse_memory_mb(&json!(-1024)).unwrap_err(),
            parse_disk_gb(&json!(-5)).unwrap_err(),
            parse_disk_gb(&json!("local-disk -10 SSD")).unwrap_err(),
            parse_cpu(&json!(-2)).unwrap_err(),
            parse_gpu(&json!(-1)).unwrap_err(),
        ] {
            assert_eq!(err.error_code(), "INVALID_REQUIREMENT");
        }
        assert!(parse_gpu(&json!(2)).unwrap());
        assert!(!parse_gpu(&json!(0)).unwrap());
        assert!(!parse_gpu(&json!("false")).unwrap());
        assert!(parse_gpu(&json!({"count": 1})).is_err());

        let values = IndexMap::from([("gpu", json!(-3))]);
        let err = ResourceRequest::from_values(&values).unwrap_err();
        assert!(matches!(err, IrError::InvalidRequirement { key: "gpu", .. }));
    }

    #[test]
    fn test_choose_cheapest_satisfying() {
        let catalog = catalog();
        let request = ResourceRequest {
            memory_mb: Some(4096),
            ..Default::default()
        };
        assert_eq!(catalog.choose(&request).unwrap().name, "medium");

        let request = ResourceRequest {
            gpu: Some(true),
            ..Default::default()
        };
        assert_eq!(catalog.choose(&request).unwrap().name, "gpu");
        assert_eq!(catalog.default_instance().unwrap().name, "small");
    }

    #[test]
    fn test_choose_fails_when_nothing_fits() {
        let request = ResourceRequest {
            memory_mb: Some(1_000_000),
            ..Default::default()
        };
        let err = catalog().choose(&request).unwrap_err();
        assert_eq!(err.error_code(), "INSTANCE_SELECTION");

        let named = ResourceRequest {
            instance_type: Some("huge".into()),
            ..Default::default()
        };
        assert!(catalog().choose(&named).is_err());
    }
}
