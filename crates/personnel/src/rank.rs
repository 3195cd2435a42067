//! Service ranks (ordered, junior → senior).

use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use nominalroll_core::DomainError;

/// Rank of a staff member.
///
/// Variants are declared junior-first so the derived `Ord` compares by
/// seniority (`a > b` means `a` is the more senior rank).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rank {
    ImmigrationAssistant3,
    ImmigrationAssistant2,
    ImmigrationAssistant1,
    AssistantInspector,
    Inspector,
    SeniorInspector,
    ChiefInspector,
    AssistantSuperintendent2,
    AssistantSuperintendent1,
    DeputySuperintendent,
    Superintendent,
    ChiefSuperintendent,
    AssistantComptroller,
    DeputyComptroller,
    Comptroller,
    AssistantComptrollerGeneral,
    DeputyComptrollerGeneral,
    ComptrollerGeneral,
}

/// Rank grouping used on nominal rolls.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadre {
    Assistant,
    Inspectorate,
    Superintendent,
    Comptroller,
}

impl Rank {
    pub const ALL: [Rank; 18] = [
        Rank::ImmigrationAssistant3,
        Rank::ImmigrationAssistant2,
        Rank::ImmigrationAssistant1,
        Rank::AssistantInspector,
        Rank::Inspector,
        Rank::SeniorInspector,
        Rank::ChiefInspector,
        Rank::AssistantSuperintendent2,
        Rank::AssistantSuperintendent1,
        Rank::DeputySuperintendent,
        Rank::Superintendent,
        Rank::ChiefSuperintendent,
        Rank::AssistantComptroller,
        Rank::DeputyComptroller,
        Rank::Comptroller,
        Rank::AssistantComptrollerGeneral,
        Rank::DeputyComptrollerGeneral,
        Rank::ComptrollerGeneral,
    ];

    /// Short code as printed on nominal rolls.
    pub fn code(&self) -> &'static str {
        match self {
            Rank::ImmigrationAssistant3 => "IA III",
            Rank::ImmigrationAssistant2 => "IA II",
            Rank::ImmigrationAssistant1 => "IA I",
            Rank::AssistantInspector => "AII",
            Rank::Inspector => "II",
            Rank::SeniorInspector => "SII",
            Rank::ChiefInspector => "CII",
            Rank::AssistantSuperintendent2 => "ASI 2",
            Rank::AssistantSuperintendent1 => "ASI 1",
            Rank::DeputySuperintendent => "DSI",
            Rank::Superintendent => "SI",
            Rank::ChiefSuperintendent => "CSI",
            Rank::AssistantComptroller => "ACI",
            Rank::DeputyComptroller => "DCI",
            Rank::Comptroller => "CIS",
            Rank::AssistantComptrollerGeneral => "ACG",
            Rank::DeputyComptrollerGeneral => "DCG",
            Rank::ComptrollerGeneral => "CGI",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Rank::ImmigrationAssistant3 => "Immigration Assistant III",
            Rank::ImmigrationAssistant2 => "Immigration Assistant II",
            Rank::ImmigrationAssistant1 => "Immigration Assistant I",
            Rank::AssistantInspector => "Assistant Inspector",
            Rank::Inspector => "Inspector",
            Rank::SeniorInspector => "Senior Inspector",
            Rank::ChiefInspector => "Chief Inspector",
            Rank::AssistantSuperintendent2 => "Assistant Superintendent II",
            Rank::AssistantSuperintendent1 => "Assistant Superintendent I",
            Rank::DeputySuperintendent => "Deputy Superintendent",
            Rank::Superintendent => "Superintendent",
            Rank::ChiefSuperintendent => "Chief Superintendent",
            Rank::AssistantComptroller => "Assistant Comptroller",
            Rank::DeputyComptroller => "Deputy Comptroller",
            Rank::Comptroller => "Comptroller",
            Rank::AssistantComptrollerGeneral => "Assistant Comptroller General",
            Rank::DeputyComptrollerGeneral => "Deputy Comptroller General",
            Rank::ComptrollerGeneral => "Comptroller General",
        }
    }

    /// 0 for the most junior rank; stored alongside the code so rolls can be
    /// ordered in SQL.
    pub fn seniority(&self) -> i16 {
        *self as i16
    }

    pub fn cadre(&self) -> Cadre {
        match self {
            Rank::ImmigrationAssistant3 | Rank::ImmigrationAssistant2 | Rank::ImmigrationAssistant1 => {
                Cadre::Assistant
            }
            Rank::AssistantInspector
            | Rank::Inspector
            | Rank::SeniorInspector
            | Rank::ChiefInspector => Cadre::Inspectorate,
            Rank::AssistantSuperintendent2
            | Rank::AssistantSuperintendent1
            | Rank::DeputySuperintendent
            | Rank::Superintendent
            | Rank::ChiefSuperintendent => Cadre::Superintendent,
            _ => Cadre::Comptroller,
        }
    }

    /// The head of service is not subject to age/tenure retirement.
    pub fn is_retirement_exempt(&self) -> bool {
        *self == Rank::ComptrollerGeneral
    }
}

/// Uppercase, drop separators, and fold trailing arabic grades into roman ones
/// so "ASI 1", "asi-i" and "ASI I" compare equal.
fn normalize(s: &str) -> String {
    let compact: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '.' && *c != '-' && *c != '_')
        .collect::<String>()
        .to_ascii_uppercase();

    for (arabic, roman) in [("3", "III"), ("2", "II"), ("1", "I")] {
        if let Some(stem) = compact.strip_suffix(arabic) {
            return format!("{stem}{roman}");
        }
    }
    compact
}

impl core::fmt::Display for Rank {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Rank {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize(s);
        if wanted.is_empty() {
            return Err(DomainError::validation("rank cannot be empty"));
        }
        Rank::ALL
            .into_iter()
            .find(|r| normalize(r.code()) == wanted || normalize(r.title()) == wanted)
            .ok_or_else(|| DomainError::validation(format!("unknown rank '{s}'")))
    }
}

impl Serialize for Rank {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for Rank {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
