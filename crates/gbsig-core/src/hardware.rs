use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
/// Console model.
///
/// Selects legacy 4-shade output or extended 15-bit color with per-tile
/// attributes, VRAM bank 1 and the color-only registers.
pub enum Model {
    #[default]
    Dmg,
    Cgb,
}

impl Model {
    #[inline]
    /// Returns whether this model runs in extended color mode.
    pub const fn is_cgb(self) -> bool {
        matches!(self, Model::Cgb)
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Model::Dmg => f.write_str("dmg"),
            Model::Cgb => f.write_str("cgb"),
        }
    }
}

impl FromStr for Model {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dmg" | "gb" => Ok(Model::Dmg),
            "cgb" | "gbc" => Ok(Model::Cgb),
            other => Err(format!("unknown model '{other}'")),
        }
    }
}
