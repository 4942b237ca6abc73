use nih_plug::prelude::*;

/// Built-in instrument the plugin plays.
#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetChoice {
    #[name = "Plucked String"]
    PluckedString,
    #[name = "Bowed String"]
    BowedString,
    #[name = "Hammered Bar"]
    HammeredBar,
    #[name = "Struck Plate"]
    StruckPlate,
    #[name = "Membrane Drum"]
    MembraneDrum,
    #[name = "String and Plate"]
    CoupledStringPlate,
}

impl PresetChoice {
    pub const ALL: [PresetChoice; 6] = [
        Self::PluckedString,
        Self::BowedString,
        Self::HammeredBar,
        Self::StruckPlate,
        Self::MembraneDrum,
        Self::CoupledStringPlate,
    ];

    /// Key in `physmod_dsp::presets`.
    pub fn preset_name(self) -> &'static str {
        match self {
            Self::PluckedString => "plucked_string",
            Self::BowedString => "bowed_string",
            Self::HammeredBar => "hammered_bar",
            Self::StruckPlate => "struck_plate",
            Self::MembraneDrum => "membrane_drum",
            Self::CoupledStringPlate => "coupled_string_plate",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Params)]
pub struct PhysmodParams {
    /// Master volume: post-everything output level.
    #[id = "volume"]
    pub volume: FloatParam,

    #[id = "preset"]
    pub preset: EnumParam<PresetChoice>,

    /// Hammer launch speed at full MIDI velocity, m/s.
    #[id = "strike"]
    pub strike_speed: FloatParam,

    /// Bow speed at full MIDI velocity, m/s.
    #[id = "bow_speed"]
    pub bow_speed: FloatParam,

    /// Bow normal force, N.
    #[id = "bow_force"]
    pub bow_force: FloatParam,
}

impl Default for PhysmodParams {
    fn default() -> Self {
        Self {
            volume: FloatParam::new(
                "Volume",
                0.5,
                FloatRange::Skewed {
                    min: 0.0,
                    max: 1.0,
                    factor: FloatRange::skew_factor(-2.0),
                },
            )
            .with_smoother(SmoothingStyle::Logarithmic(5.0))
            .with_unit(" %")
            .with_value_to_string(formatters::v2s_f32_percentage(0))
            .with_string_to_value(formatters::s2v_f32_percentage()),

            preset: EnumParam::new("Preset", PresetChoice::PluckedString),

            strike_speed: FloatParam::new(
                "Strike Speed",
                2.0,
                FloatRange::Skewed {
                    min: 0.1,
                    max: 10.0,
                    factor: FloatRange::skew_factor(-1.0),
                },
            )
            .with_unit(" m/s")
            .with_step_size(0.01),

            bow_speed: FloatParam::new(
                "Bow Speed",
                0.2,
                FloatRange::Linear {
                    min: 0.02,
                    max: 1.0,
                },
            )
            .with_unit(" m/s")
            .with_step_size(0.01),

            bow_force: FloatParam::new(
                "Bow Force",
                0.2,
                FloatRange::Linear {
                    min: 0.0,
                    max: 0.4,
                },
            )
            .with_smoother(SmoothingStyle::Linear(50.0))
            .with_unit(" N")
            .with_step_size(0.01),
        }
    }
}
