//! Region-based ingestion endpoint selection.

/// Data-residency region; selects the default collector base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Us,
    Eu,
    Hipaa,
}

impl Region {
    /// The default base URL for this region. Callers may still override via
    /// explicit configuration.
    pub fn default_base_url(self) -> &'static str {
        match self {
            Region::Us => "https://us.cloud.example-observability.com",
            Region::Eu => "https://cloud.example-observability.com",
            Region::Hipaa => "https://hipaa.cloud.example-observability.com",
        }
    }
}

impl Default for Region {
    fn default() -> Self {
        Region::Us
    }
}

impl std::str::FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "us" => Ok(Region::Us),
            "eu" => Ok(Region::Eu),
            "hipaa" => Ok(Region::Hipaa),
            other => Err(format!("unknown region: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_region_has_a_distinct_base_url() {
        assert_ne!(Region::Us.default_base_url(), Region::Eu.default_base_url());
        assert_ne!(Region::Eu.default_base_url(), Region::Hipaa.default_base_url());
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("EU".parse::<Region>().unwrap(), Region::Eu);
        assert_eq!("hipaa".parse::<Region>().unwrap(), Region::Hipaa);
        assert!("mars".parse::<Region>().is_err());
    }

    #[test]
    fn default_is_us() {
        assert_eq!(Region::default(), Region::Us);
    }
}
