//! Parsing for Kubernetes resource quantity strings.
//!
//! The upstream `Quantity` type is an opaque string ("500m", "100Gi",
//! "123e8"). The scheduler needs real numbers out of it in two places:
//! container resource requests and advertised-capacity validation. CPU and
//! memory quantities cannot be told apart from the data alone (a bare "2" is
//! valid for both), so the caller picks the interpretation.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuantityError {
    #[error("malformed quantity {0:?}")]
    Malformed(String),
    #[error("quantity {0:?} is not a cpu value")]
    NotCpu(String),
    #[error("quantity {0:?} is not a memory value")]
    NotMemory(String),
}

/// Number of cores described by a cpu quantity ("500m" is 0.5).
pub fn cpu_cores(quantity: &Quantity) -> Result<f64, QuantityError> {
    let (value, suffix) = split(&quantity.0)?;
    match suffix {
        "" => Ok(value),
        "m" => Ok(value / 1000.0),
        _ => Err(QuantityError::NotCpu(quantity.0.clone())),
    }
}

/// Number of bytes described by a memory or storage quantity.
pub fn memory_bytes(quantity: &Quantity) -> Result<f64, QuantityError> {
    let (value, suffix) = split(&quantity.0)?;
    match multiplier(suffix) {
        Some(m) => Ok(value * m),
        None => Err(QuantityError::NotMemory(quantity.0.clone())),
    }
}

/// Plain object count (the `pods` capacity field).
pub fn count(quantity: &Quantity) -> Result<u64, QuantityError> {
    let (value, suffix) = split(&quantity.0)?;
    if !suffix.is_empty() || value < 0.0 || value.fract() != 0.0 {
        return Err(QuantityError::Malformed(quantity.0.clone()));
    }
    Ok(value as u64)
}

/// Splits a quantity string into its numeric value and unit suffix. The
/// suffix starts after the last numeric character, which keeps decimal
/// exponents ("123e8") inside the number.
fn split(raw: &str) -> Result<(f64, &str), QuantityError> {
    let raw = raw.trim();
    let suffix = match raw.rsplit_once(char::is_numeric) {
        Some((_, suffix)) => suffix,
        None => return Err(QuantityError::Malformed(raw.to_string())),
    };
    let number = &raw[..raw.len() - suffix.len()];
    let value: f64 = number
        .parse()
        .map_err(|_| QuantityError::Malformed(raw.to_string()))?;
    Ok((value, suffix))
}

fn multiplier(suffix: &str) -> Option<f64> {
    let m = match suffix {
        "" => 1.0,
        "k" | "K" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        "Ki" => 1024.0,
        "Mi" => 1024f64.powi(2),
        "Gi" => 1024f64.powi(3),
        "Ti" => 1024f64.powi(4),
        "Pi" => 1024f64.powi(5),
        "Ei" => 1024f64.powi(6),
        _ => return None,
    };
    Some(m)
}

#[cfg(test)]
mod test {
    use super::*;

    fn q(raw: &str) -> Quantity {
        Quantity(raw.to_string())
    }

    #[test]
    fn cpu_quantities() {
        assert_eq!(cpu_cores(&q("1")).unwrap(), 1.0);
        assert_eq!(cpu_cores(&q("500m")).unwrap(), 0.5);
        assert_eq!(cpu_cores(&q("100m")).unwrap(), 0.1);
        assert_eq!(cpu_cores(&q("1.25")).unwrap(), 1.25);
        cpu_cores(&q("512Mi")).unwrap_err();
    }

    #[test]
    fn memory_quantities() {
        assert_eq!(memory_bytes(&q("128")).unwrap(), 128.0);
        assert_eq!(memory_bytes(&q("128Mi")).unwrap(), 128.0 * 1024.0 * 1024.0);
        assert_eq!(memory_bytes(&q("1Gi")).unwrap(), 1024f64.powi(3));
        assert_eq!(memory_bytes(&q("500K")).unwrap(), 500_000.0);
        assert_eq!(memory_bytes(&q("123e8")).unwrap(), 123e8);
        memory_bytes(&q("500m")).unwrap_err();
        memory_bytes(&q("gigawatts")).unwrap_err();
    }

    #[test]
    fn counts() {
        assert_eq!(count(&q("20")).unwrap(), 20);
        assert_eq!(count(&q("1")).unwrap(), 1);
        count(&q("1.5")).unwrap_err();
        count(&q("20Gi")).unwrap_err();
    }
}
