// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Construction-time knobs: sampling rates, encoding and sampling schemes.
//!
//! A loaded index must be opened with the same schemes and rates it was
//! built with; the CLI persists the configuration as `config.json` next to
//! the index so later invocations pick it up automatically.

use std::io;

use serde::{Deserialize, Serialize};

use crate::npa::NpaScheme;
use crate::sampled::SamplingScheme;

/// Index construction parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuccinctConfig {
    pub sa_sampling_rate: u32,
    pub isa_sampling_rate: u32,
    pub npa_sampling_rate: u32,
    pub context_len: u32,
    pub npa_encoding: NpaScheme,
    pub sa_sampling_scheme: SamplingScheme,
    pub isa_sampling_scheme: SamplingScheme,
    /// Layer count driver for layered schemes: base rate is
    /// `sampling_rate * sampling_range`.
    pub sampling_range: u32,
}

impl Default for SuccinctConfig {
    fn default() -> Self {
        Self {
            sa_sampling_rate: 32,
            isa_sampling_rate: 32,
            npa_sampling_rate: 128,
            context_len: 3,
            npa_encoding: NpaScheme::EliasGamma,
            sa_sampling_scheme: SamplingScheme::FlatByIndex,
            isa_sampling_scheme: SamplingScheme::FlatByIndex,
            sampling_range: 8,
        }
    }
}

impl SuccinctConfig {
    /// A layered configuration with both SA and ISA layered.
    pub fn layered(opportunistic: bool) -> Self {
        let scheme = if opportunistic {
            SamplingScheme::OpportunisticLayeredByIndex
        } else {
            SamplingScheme::LayeredByIndex
        };
        Self {
            sa_sampling_scheme: scheme,
            isa_sampling_scheme: scheme,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> io::Result<()> {
        let bad = |msg: String| Err(io::Error::new(io::ErrorKind::InvalidInput, msg));
        if self.sa_sampling_rate == 0 || self.isa_sampling_rate == 0 || self.npa_sampling_rate == 0
        {
            return bad("sampling rates must be nonzero".to_string());
        }
        if self.context_len == 0 {
            return bad("context length must be nonzero".to_string());
        }
        if self.isa_sampling_scheme == SamplingScheme::FlatByValue
            && self.sa_sampling_scheme != SamplingScheme::FlatByValue
        {
            return bad("by-value ISA sampling requires by-value SA sampling".to_string());
        }
        for (name, scheme, rate) in [
            ("sa", self.sa_sampling_scheme, self.sa_sampling_rate),
            ("isa", self.isa_sampling_scheme, self.isa_sampling_rate),
        ] {
            if scheme.is_layered() {
                if !rate.is_power_of_two() || !self.sampling_range.is_power_of_two() {
                    return bad(format!(
                        "layered {} sampling needs power-of-two rate and range",
                        name
                    ));
                }
                if self.sampling_range < 2 {
                    return bad(format!("layered {} sampling needs range >= 2", name));
                }
            }
            if scheme == SamplingScheme::FlatByValue && !rate.is_power_of_two() {
                return bad(format!("by-value {} sampling needs a power-of-two rate", name));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        SuccinctConfig::default().validate().unwrap();
        SuccinctConfig::layered(false).validate().unwrap();
        SuccinctConfig::layered(true).validate().unwrap();
    }

    #[test]
    fn mismatched_by_value_schemes_rejected() {
        let cfg = SuccinctConfig {
            isa_sampling_scheme: SamplingScheme::FlatByValue,
            ..SuccinctConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn layered_requires_power_of_two() {
        let cfg = SuccinctConfig {
            sa_sampling_scheme: SamplingScheme::LayeredByIndex,
            sa_sampling_rate: 24,
            ..SuccinctConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
