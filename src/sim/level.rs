use serde::Deserialize;

/// Named course presets selectable from the menu.
///
/// Unknown or missing ids resolve to [`LevelTheme::Grassland`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelTheme {
    #[default]
    Grassland,
    Desert,
    Snow,
}

/// Physics-facing knobs of a theme.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelParams {
    /// Multiplies every wave term of the height function.
    pub difficulty: f32,
    pub coin_chance: f32,
    pub fuel_chance: f32,
    /// Scales engine, reverse and brake force.
    pub friction: f32,
    /// Scales all fuel use.
    pub fuel_consumption: f32,
}

/// Render-only colors of a theme. Linear sRGB triplets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelPalette {
    pub sky_top: [f32; 3],
    pub sky_horizon: [f32; 3],
    pub ground_surface: [f32; 3],
    pub ground_fill: [f32; 3],
    pub ridge_line: [f32; 3],
}

impl LevelTheme {
    pub const ALL: [LevelTheme; 3] = [LevelTheme::Grassland, LevelTheme::Desert, LevelTheme::Snow];

    pub fn parse(id: &str) -> Option<Self> {
        match id.trim().to_ascii_lowercase().as_str() {
            "grassland" => Some(Self::Grassland),
            "desert" => Some(Self::Desert),
            "snow" => Some(Self::Snow),
            _ => None,
        }
    }

    pub fn from_id(id: &str) -> Self {
        Self::parse(id).unwrap_or_default()
    }

    pub fn id(self) -> &'static str {
        match self {
            Self::Grassland => "grassland",
            Self::Desert => "desert",
            Self::Snow => "snow",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Grassland => "Grassland",
            Self::Desert => "Desert",
            Self::Snow => "Snow",
        }
    }

    pub fn params(self) -> LevelParams {
        match self {
            Self::Grassland => LevelParams {
                difficulty: 1.0,
                coin_chance: 0.04,
                fuel_chance: 0.012,
                friction: 1.0,
                fuel_consumption: 1.0,
            },
            Self::Desert => LevelParams {
                difficulty: 1.2,
                coin_chance: 0.05,
                fuel_chance: 0.009,
                friction: 0.85,
                fuel_consumption: 1.25,
            },
            Self::Snow => LevelParams {
                difficulty: 1.35,
                coin_chance: 0.035,
                fuel_chance: 0.014,
                friction: 0.7,
                fuel_consumption: 1.1,
            },
        }
    }

    pub fn palette(self) -> LevelPalette {
        match self {
            Self::Grassland => LevelPalette {
                sky_top: [0.10, 0.10, 0.18],
                sky_horizon: [0.91, 0.27, 0.38],
                ground_surface: [0.29, 0.49, 0.25],
                ground_fill: [0.36, 0.24, 0.18],
                ridge_line: [0.42, 0.75, 0.37],
            },
            Self::Desert => LevelPalette {
                sky_top: [0.10, 0.06, 0.0],
                sky_horizon: [0.91, 0.63, 0.27],
                ground_surface: [0.80, 0.62, 0.36],
                ground_fill: [0.55, 0.36, 0.19],
                ridge_line: [0.93, 0.78, 0.50],
            },
            Self::Snow => LevelPalette {
                sky_top: [0.05, 0.11, 0.16],
                sky_horizon: [0.48, 0.64, 0.77],
                ground_surface: [0.88, 0.92, 0.96],
                ground_fill: [0.42, 0.50, 0.60],
                ridge_line: [0.97, 0.98, 1.0],
            },
        }
    }
}
