use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity provider a user connected. A platform groups one or more
/// crawlable services under a single OAuth grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    Google,
    Microsoft,
    Notion,
    Local,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Google => "GOOGLE",
            Platform::Microsoft => "MICROSOFT",
            Platform::Notion => "NOTION",
            Platform::Local => "LOCAL",
        }
    }

    /// Services crawled under this platform's grant.
    pub fn services(&self) -> &'static [Service] {
        match self {
            Platform::Google => &[Service::GoogleDrive, Service::GoogleGmail],
            Platform::Microsoft => &[Service::MicrosoftDrive],
            Platform::Notion => &[Service::Notion],
            Platform::Local => &[],
        }
    }

    /// Provider name used when asking the integration service for a token.
    pub fn provider_name(&self) -> &'static str {
        match self {
            Platform::Google => "google",
            Platform::Microsoft => "microsoft",
            Platform::Notion => "notion",
            Platform::Local => "local",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GOOGLE" => Ok(Platform::Google),
            "MICROSOFT" => Ok(Platform::Microsoft),
            "NOTION" => Ok(Platform::Notion),
            "LOCAL" => Ok(Platform::Local),
            other => Err(format!("unknown platform: {}", other)),
        }
    }
}

/// A single crawlable third-party service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Service {
    GoogleDrive,
    GoogleGmail,
    MicrosoftDrive,
    Notion,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::GoogleDrive => "GOOGLE_DRIVE",
            Service::GoogleGmail => "GOOGLE_GMAIL",
            Service::MicrosoftDrive => "MICROSOFT_DRIVE",
            Service::Notion => "NOTION",
        }
    }

    pub fn platform(&self) -> Platform {
        match self {
            Service::GoogleDrive | Service::GoogleGmail => Platform::Google,
            Service::MicrosoftDrive => Platform::Microsoft,
            Service::Notion => Platform::Notion,
        }
    }

    /// OAuth scope fragment that grants this service, where the platform
    /// issues per-service scopes. Notion and Microsoft grants are implicit.
    pub fn required_scope(&self) -> Option<&'static str> {
        match self {
            Service::GoogleDrive => Some("drive.readonly"),
            Service::GoogleGmail => Some("gmail.readonly"),
            Service::MicrosoftDrive | Service::Notion => None,
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Service {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GOOGLE_DRIVE" => Ok(Service::GoogleDrive),
            "GOOGLE_GMAIL" => Ok(Service::GoogleGmail),
            "MICROSOFT_DRIVE" => Ok(Service::MicrosoftDrive),
            "NOTION" => Ok(Service::Notion),
            other => Err(format!("unknown service: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_round_trip() {
        for p in [
            Platform::Google,
            Platform::Microsoft,
            Platform::Notion,
            Platform::Local,
        ] {
            assert_eq!(p.as_str().parse::<Platform>().unwrap(), p);
        }
    }

    #[test]
    fn service_round_trip() {
        for s in [
            Service::GoogleDrive,
            Service::GoogleGmail,
            Service::MicrosoftDrive,
            Service::Notion,
        ] {
            assert_eq!(s.as_str().parse::<Service>().unwrap(), s);
            assert!(s.platform().services().contains(&s));
        }
    }

    #[test]
    fn google_scopes() {
        assert_eq!(
            Service::GoogleDrive.required_scope(),
            Some("drive.readonly")
        );
        assert_eq!(
            Service::GoogleGmail.required_scope(),
            Some("gmail.readonly")
        );
        assert_eq!(Service::Notion.required_scope(), None);
    }
}
