//! Shadow Settings
//!
//! Three-tier shadow settings table with serde support for tooling.
//!
//! # Tiers
//!
//! - **System**: named [`ShadowSettingsSystem`] records (method, precision,
//!   filtering). A light lists `(level, name)` pairs and the entry closest to,
//!   but not above, the current system detail level is chosen.
//! - **Light**: a [`ShadowSettingsLight`] carried by each light (biases,
//!   resolution adjustment, statistics tuning).
//! - **LOD**: a [`LodOverride`] per [`LodTier`] that can pin the resolution,
//!   filter quality and update rate.
//!
//! The merged [`ShadowSettings`] is what the generator consumes.

use std::collections::BTreeMap;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};
use umbra_core::{LightingError, LightingResult};
use umbra_driver::{CullMode, SurfaceFormat};

/// Shadow method and option flags, used to generate system settings
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShadowMethodFlags(u32);

impl ShadowMethodFlags {
    pub const NONE: Self = Self(0);

    /// Percentage closer filtering
    pub const PCF: Self = Self(1 << 0);
    /// Percentage closer soft shadows
    pub const PCSS: Self = Self(1 << 1);
    /// Variance shadow maps
    pub const VSM: Self = Self(1 << 2);
    /// Exponential shadow maps
    pub const ESM: Self = Self(1 << 3);
    /// Exponential variance shadow maps
    pub const EVSM: Self = Self(1 << 4);
    /// Reflective shadow maps (indirect lighting)
    pub const RSM: Self = Self(1 << 5);

    /// 16 bit precision
    pub const BITS_16: Self = Self(1 << 8);
    /// 24 bit precision
    pub const BITS_24: Self = Self(1 << 9);
    /// 32 bit precision
    pub const BITS_32: Self = Self(1 << 10);

    /// Depth extents mask
    pub const DEPTH_EXTENTS_MASK: Self = Self(1 << 12);
    /// 16 bit depth extents
    pub const EXTENTS_BITS_16: Self = Self(1 << 13);
    /// Edge-only mask
    pub const EDGE_MASK: Self = Self(1 << 14);

    pub const JITTER: Self = Self(1 << 16);
    pub const ROTATE: Self = Self(1 << 17);
    pub const NORMAL_OFFSET: Self = Self(1 << 18);
    pub const TRANSLUCENCY: Self = Self(1 << 19);

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Check if all specified flags are set
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ShadowMethodFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Shadow filtering method
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShadowMethod {
    /// Hardware / software depth compare with PCF
    #[default]
    Pcf,
    /// PCF with blocker search
    Pcss,
    /// Variance shadow maps (2 moments)
    Vsm,
    /// Exponential shadow maps (1 moment)
    Esm,
    /// Exponential variance shadow maps (4 moments)
    Evsm,
    /// Reflective shadow map: depth + normal + flux
    Rsm,
}

impl ShadowMethod {
    /// Channels of the statistics target for moment based methods
    pub fn statistics_channels(self) -> Option<u32> {
        match self {
            Self::Vsm => Some(2),
            Self::Esm => Some(1),
            Self::Evsm => Some(4),
            _ => None,
        }
    }

    pub fn is_statistics(self) -> bool {
        self.statistics_channels().is_some()
    }

    pub fn is_reflective(self) -> bool {
        self == Self::Rsm
    }
}

/// Edge / extents mask
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaskType {
    #[default]
    None,
    DepthExtents,
    Edge,
}

/// Filter quality tier
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FilterQuality {
    Low,
    #[default]
    Medium,
    High,
}

impl FilterQuality {
    /// Primary filter sample count
    pub fn samples(self) -> u32 {
        match self {
            Self::Low => 4,
            Self::Medium => 8,
            Self::High => 16,
        }
    }
}

/// How often a light's shadow is refreshed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateRate {
    /// Rendered once, then only on explicit invalidation
    Never,
    /// Every frame
    #[default]
    Always,
    /// At most N times per second
    Fps(u32),
}

impl UpdateRate {
    /// Minimum seconds between refreshes (`None` for `Never`)
    pub fn interval(self) -> Option<f32> {
        match self {
            Self::Never => None,
            Self::Always => Some(0.0),
            Self::Fps(n) => Some(1.0 / n.max(1) as f32),
        }
    }
}

/// Light level-of-detail tier, ordered from culled to best
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LodTier {
    /// Beyond the shadow distance
    #[default]
    Off,
    Low,
    Medium,
    High,
}

impl LodTier {
    /// Resolution halvings applied when no override pins the resolution
    pub fn resolution_shift(self) -> u32 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low | Self::Off => 2,
        }
    }
}

/// System-wide shadow settings record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowSettingsSystem {
    pub method: ShadowMethod,
    /// Bits of precision (0 = driver chooses)
    pub precision: u32,
    /// Halvings of the maximum resolution
    pub resolution_adjust: i32,
    pub primary_samples: u32,
    pub secondary_samples: u32,
    pub bilinear_filtering: bool,
    pub trilinear_filtering: bool,
    pub anisotropy: u32,
    pub auto_generate_mipmaps: bool,
    /// Blur passes for moment based methods
    pub filter_passes: u32,
    pub mask_type: MaskType,
    pub mask_precision: u32,
    pub jitter: bool,
    pub rotate: bool,
    pub normal_offset: bool,
    pub translucency: bool,
    pub update_rate: UpdateRate,
}

impl Default for ShadowSettingsSystem {
    fn default() -> Self {
        Self {
            method: ShadowMethod::Pcf,
            precision: 32,
            resolution_adjust: 0,
            primary_samples: 8,
            secondary_samples: 0,
            bilinear_filtering: false,
            trilinear_filtering: false,
            anisotropy: 0,
            auto_generate_mipmaps: false,
            filter_passes: 0,
            mask_type: MaskType::None,
            mask_precision: 0,
            jitter: false,
            rotate: false,
            normal_offset: false,
            translucency: false,
            update_rate: UpdateRate::Always,
        }
    }
}

/// Per-light shadow settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowSettingsLight {
    /// Halvings added to the system adjustment
    pub resolution_adjust: i32,
    pub cull_mode: CullMode,
    /// Depth bias to prevent shadow acne
    pub depth_bias: f32,
    /// Slope-scaled depth bias
    pub slope_bias: f32,
    /// Normal-based offset to prevent peter-panning
    pub normal_bias: f32,
    /// Filter radius at the near / far filter distance
    pub filter_radius: [f32; 2],
    pub filter_distance: [f32; 2],
    /// VSM light bleeding reduction
    pub minimum_variance: f32,
    /// ESM exponent
    pub exponent: f32,
    pub minimum_cutoff: f32,
    /// Shadow strength (0 = no shadow, 1 = full shadow)
    pub intensity: f32,
    pub translucency: bool,
    /// Overrides the system update rate
    pub update_rate: Option<UpdateRate>,
}

impl Default for ShadowSettingsLight {
    fn default() -> Self {
        Self {
            resolution_adjust: 0,
            cull_mode: CullMode::Front,
            depth_bias: 0.005,
            slope_bias: 2.0,
            normal_bias: 0.02,
            filter_radius: [1.0, 1.0],
            filter_distance: [0.0, 0.0],
            minimum_variance: 0.0001,
            exponent: 40.0,
            minimum_cutoff: 0.2,
            intensity: 1.0,
            translucency: false,
            update_rate: None,
        }
    }
}

impl ShadowSettingsLight {
    /// Settings for a point light (omnidirectional)
    pub fn point() -> Self {
        Self {
            depth_bias: 0.01,
            slope_bias: 3.0,
            normal_bias: 0.03,
            ..Default::default()
        }
    }

    /// Settings for a directional light
    pub fn directional() -> Self {
        Self {
            depth_bias: 0.002,
            slope_bias: 1.5,
            normal_bias: 0.01,
            ..Default::default()
        }
    }

    /// Set shadow strength
    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = intensity.clamp(0.0, 1.0);
        self
    }

    pub fn with_update_rate(mut self, rate: UpdateRate) -> Self {
        self.update_rate = Some(rate);
        self
    }

    pub fn with_resolution_adjust(mut self, adjust: i32) -> Self {
        self.resolution_adjust = adjust;
        self
    }
}

/// Per-tier override
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodOverride {
    /// Pinned resolution (power of two)
    pub resolution: Option<u32>,
    pub filter_quality: Option<FilterQuality>,
    pub update_rate: Option<UpdateRate>,
}

impl LodOverride {
    pub fn resolution(resolution: u32) -> Self {
        Self {
            resolution: Some(resolution),
            ..Default::default()
        }
    }

    pub fn with_update_rate(mut self, rate: UpdateRate) -> Self {
        self.update_rate = Some(rate);
        self
    }

    pub fn with_filter_quality(mut self, quality: FilterQuality) -> Self {
        self.filter_quality = Some(quality);
        self
    }
}

/// A `(level, name)` reference from a light to a system settings entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowSettingsLod {
    pub level: i32,
    pub name: String,
}

impl ShadowSettingsLod {
    pub fn new(level: i32, name: impl Into<String>) -> Self {
        Self {
            level,
            name: name.into(),
        }
    }
}

/// Surface formats chosen for a validated system settings record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedFormats {
    /// Readable depth (or single channel depth target)
    pub depth: SurfaceFormat,
    /// Write-only depth-stencil for moment based methods
    pub depth_stencil: Option<SurfaceFormat>,
    pub statistics: Option<SurfaceFormat>,
    /// Reflective channels
    pub normal: Option<SurfaceFormat>,
    pub color: Option<SurfaceFormat>,
    pub packed: Option<SurfaceFormat>,
    pub mask: Option<SurfaceFormat>,
}

impl ResolvedFormats {
    /// Formats assuming every format is supported
    pub fn assume_supported(settings: &ShadowSettingsSystem) -> Self {
        // Only fails for invalid precision; fall back to the plain depth layout
        validate_shadow_settings(settings, |_| true).unwrap_or(Self {
            depth: SurfaceFormat::Depth32Float,
            depth_stencil: None,
            statistics: None,
            normal: None,
            color: None,
            packed: None,
            mask: None,
        })
    }
}

/// Populate a system settings record from method flags.
///
/// Methods are picked in priority order PCSS, PCF, EVSM, ESM, VSM, RSM;
/// precision 16, 24, 32. Everything not named by a flag keeps its default.
pub fn generate_shadow_settings(flags: ShadowMethodFlags) -> ShadowSettingsSystem {
    let mut settings = ShadowSettingsSystem {
        precision: 0,
        ..Default::default()
    };

    settings.method = if flags.contains(ShadowMethodFlags::PCSS) {
        ShadowMethod::Pcss
    } else if flags.contains(ShadowMethodFlags::PCF) {
        ShadowMethod::Pcf
    } else if flags.contains(ShadowMethodFlags::EVSM) {
        ShadowMethod::Evsm
    } else if flags.contains(ShadowMethodFlags::ESM) {
        ShadowMethod::Esm
    } else if flags.contains(ShadowMethodFlags::VSM) {
        ShadowMethod::Vsm
    } else if flags.contains(ShadowMethodFlags::RSM) {
        ShadowMethod::Rsm
    } else {
        ShadowMethod::Pcf
    };

    if flags.contains(ShadowMethodFlags::BITS_16) {
        settings.precision = 16;
    } else if flags.contains(ShadowMethodFlags::BITS_24) {
        settings.precision = 24;
    } else if flags.contains(ShadowMethodFlags::BITS_32) {
        settings.precision = 32;
    }

    if flags.contains(ShadowMethodFlags::DEPTH_EXTENTS_MASK) {
        settings.mask_type = MaskType::DepthExtents;
        settings.mask_precision = if flags.contains(ShadowMethodFlags::EXTENTS_BITS_16) { 16 } else { 8 };
    } else if flags.contains(ShadowMethodFlags::EDGE_MASK) {
        settings.mask_type = MaskType::Edge;
        settings.mask_precision = 8;
    }

    settings.jitter = flags.contains(ShadowMethodFlags::JITTER);
    settings.rotate = flags.contains(ShadowMethodFlags::ROTATE);
    settings.normal_offset = flags.contains(ShadowMethodFlags::NORMAL_OFFSET);
    settings.translucency = flags.contains(ShadowMethodFlags::TRANSLUCENCY);

    if settings.method.is_statistics() {
        settings.bilinear_filtering = true;
        settings.filter_passes = 1;
    }

    settings
}

/// Check a system settings record against the formats a driver supports.
///
/// On success returns the formats the generator should allocate.
pub fn validate_shadow_settings(
    settings: &ShadowSettingsSystem,
    supported: impl Fn(SurfaceFormat) -> bool,
) -> LightingResult<ResolvedFormats> {
    let name = format!("{:?}", settings.method);
    let invalid = |reason: String| LightingError::invalid_settings(name.clone(), reason);

    if !matches!(settings.precision, 0 | 16 | 24 | 32) {
        return Err(invalid(format!("unsupported precision {}", settings.precision)));
    }
    if settings.primary_samples > 64 || settings.secondary_samples > 64 {
        return Err(invalid("more than 64 filter samples".into()));
    }
    if settings.anisotropy > 16 {
        return Err(invalid(format!("anisotropy {} exceeds 16", settings.anisotropy)));
    }
    if settings.update_rate == UpdateRate::Fps(0) {
        return Err(invalid("update rate of 0 fps".into()));
    }

    let precision = if settings.precision == 0 { 16 } else { settings.precision };
    let mut formats = ResolvedFormats {
        depth: SurfaceFormat::Depth32Float,
        depth_stencil: None,
        statistics: None,
        normal: None,
        color: None,
        packed: None,
        mask: None,
    };

    match settings.method {
        ShadowMethod::Pcf | ShadowMethod::Pcss => {
            if settings.primary_samples == 0 {
                return Err(invalid("PCF requires at least one sample".into()));
            }
            formats.depth = SurfaceFormat::best_depth(precision, &supported)
                .or_else(|| SurfaceFormat::best_render_target(precision, 1, &supported))
                .ok_or_else(|| invalid(format!("no {}-bit depth format", precision)))?;
        }
        ShadowMethod::Vsm | ShadowMethod::Esm | ShadowMethod::Evsm => {
            let channels = settings.method.statistics_channels().unwrap_or(1);
            formats.depth = SurfaceFormat::best_render_target(precision, 1, &supported)
                .ok_or_else(|| invalid(format!("no {}-bit depth target", precision)))?;
            formats.statistics = Some(
                SurfaceFormat::best_render_target(precision, channels, &supported).ok_or_else(
                    || invalid(format!("no {}-bit {} channel statistics target", precision, channels)),
                )?,
            );
            formats.depth_stencil = Some(
                SurfaceFormat::best_depth(24, &supported)
                    .ok_or_else(|| invalid("no depth-stencil format".into()))?,
            );
        }
        ShadowMethod::Rsm => {
            formats.depth = SurfaceFormat::best_depth(precision, &supported)
                .ok_or_else(|| invalid(format!("no {}-bit depth format", precision)))?;
            formats.normal = Some(
                SurfaceFormat::best_render_target(8, 4, &supported)
                    .ok_or_else(|| invalid("no normal target".into()))?,
            );
            formats.color = Some(
                SurfaceFormat::best_render_target(8, 4, &supported)
                    .ok_or_else(|| invalid("no flux target".into()))?,
            );
            formats.packed = Some(
                SurfaceFormat::best_render_target(16, 4, &supported)
                    .ok_or_else(|| invalid("no packed depth-normal target".into()))?,
            );
        }
    }

    formats.mask = match settings.mask_type {
        MaskType::None => None,
        MaskType::DepthExtents => {
            let (bits, channels) = if settings.mask_precision == 16 { (16, 2) } else { (8, 4) };
            Some(
                SurfaceFormat::best_render_target(bits, channels, &supported)
                    .ok_or_else(|| invalid("no depth extents mask format".into()))?,
            )
        }
        MaskType::Edge => Some(
            SurfaceFormat::best_render_target(8, 4, &supported)
                .ok_or_else(|| invalid("no edge mask format".into()))?,
        ),
    };

    Ok(formats)
}

/// Fully merged settings for one light at one tier
#[derive(Clone, Debug, PartialEq)]
pub struct ShadowSettings {
    /// Name of the system entry that was selected
    pub name: String,
    pub system: ShadowSettingsSystem,
    pub light: ShadowSettingsLight,
    pub tier: LodTier,
    /// Final square resolution
    pub resolution: u32,
    pub filter_quality: FilterQuality,
    pub update_rate: UpdateRate,
    pub formats: ResolvedFormats,
}

impl ShadowSettings {
    pub fn method(&self) -> ShadowMethod {
        self.system.method
    }

    /// Translucency only when both system and light enable it
    pub fn translucency(&self) -> bool {
        self.system.translucency && self.light.translucency
    }

    /// Combined resolution adjustment
    pub fn resolution_adjust(&self) -> i32 {
        self.system.resolution_adjust + self.light.resolution_adjust
    }

    pub fn samples(&self) -> u32 {
        self.filter_quality.samples()
    }
}

/// The shadow settings table, loaded as data
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowSettingsTable {
    /// Entry used when no LOD entry matches
    pub default_name: String,
    pub entries: BTreeMap<String, ShadowSettingsSystem>,
    pub tiers: BTreeMap<LodTier, LodOverride>,
    pub min_resolution: u32,
    pub max_resolution: u32,
    #[serde(skip)]
    formats: BTreeMap<String, ResolvedFormats>,
}

impl Default for ShadowSettingsTable {
    fn default() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            "default".to_string(),
            generate_shadow_settings(ShadowMethodFlags::PCF | ShadowMethodFlags::BITS_32),
        );
        Self {
            default_name: "default".to_string(),
            entries,
            tiers: BTreeMap::new(),
            min_resolution: 128,
            max_resolution: 2048,
            formats: BTreeMap::new(),
        }
    }
}

impl ShadowSettingsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from JSON
    pub fn from_json(json: &str) -> LightingResult<Self> {
        let mut table: Self = serde_json::from_str(json)
            .map_err(|e| LightingError::invalid_settings("table", e.to_string()))?;
        table.normalize_range();
        Ok(table)
    }

    pub fn to_json(&self) -> LightingResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| LightingError::invalid_settings("table", e.to_string()))
    }

    /// Add a named entry after validating it. Existing names are kept.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        settings: ShadowSettingsSystem,
        supported: impl Fn(SurfaceFormat) -> bool,
    ) -> LightingResult<()> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Ok(());
        }
        let formats = validate_shadow_settings(&settings, supported).map_err(|e| match e {
            LightingError::InvalidShadowSettings { reason, .. } => {
                LightingError::invalid_settings(name.clone(), reason)
            }
            other => other,
        })?;
        self.formats.insert(name.clone(), formats);
        self.entries.insert(name, settings);
        Ok(())
    }

    pub fn with_tier(mut self, tier: LodTier, over: LodOverride) -> Self {
        self.tiers.insert(tier, over);
        self
    }

    pub fn with_resolution_range(mut self, min: u32, max: u32) -> Self {
        self.min_resolution = min;
        self.max_resolution = max;
        self.normalize_range();
        self
    }

    /// Snap the resolution range to powers of two with `min <= max`.
    ///
    /// A reversed range is swapped rather than rejected.
    pub fn normalize_range(&mut self) {
        if self.min_resolution > self.max_resolution {
            log::warn!(
                "shadow resolution range {}..={} reversed, swapping",
                self.min_resolution,
                self.max_resolution
            );
            std::mem::swap(&mut self.min_resolution, &mut self.max_resolution);
        }
        self.min_resolution = self.min_resolution.clamp(16, 16384).next_power_of_two();
        self.max_resolution = self
            .max_resolution
            .clamp(self.min_resolution, 16384)
            .next_power_of_two();
    }

    /// Validate every entry and tier against driver support.
    ///
    /// Invalid entries are regenerated from the system default (logged),
    /// invalid tier values are dropped. Returns the errors that were repaired.
    pub fn validate(&mut self, supported: impl Fn(SurfaceFormat) -> bool) -> Vec<LightingError> {
        let mut repaired = Vec::new();
        self.normalize_range();

        let fallback = generate_shadow_settings(ShadowMethodFlags::PCF | ShadowMethodFlags::BITS_16);
        if !self.entries.contains_key(&self.default_name) {
            repaired.push(LightingError::invalid_settings(
                self.default_name.clone(),
                "default entry missing",
            ));
            self.entries.insert(self.default_name.clone(), fallback.clone());
        }

        self.formats.clear();
        let names: Vec<String> = self.entries.keys().cloned().collect();
        for name in names {
            let Some(settings) = self.entries.get(&name) else {
                continue;
            };
            match validate_shadow_settings(settings, &supported) {
                Ok(formats) => {
                    self.formats.insert(name, formats);
                }
                Err(err) => {
                    log::warn!("shadow settings '{}' invalid ({}), regenerating from defaults", name, err);
                    let mut replacement = fallback.clone();
                    // Keep reflective entries reflective so indirect lighting still has an RSM
                    if settings.method.is_reflective() {
                        replacement = generate_shadow_settings(ShadowMethodFlags::RSM);
                    }
                    let formats = ResolvedFormats::assume_supported(&replacement);
                    let formats = validate_shadow_settings(&replacement, &supported).unwrap_or(formats);
                    self.formats.insert(name.clone(), formats);
                    self.entries.insert(name.clone(), replacement);
                    repaired.push(match err {
                        LightingError::InvalidShadowSettings { reason, .. } => {
                            LightingError::invalid_settings(name, reason)
                        }
                        other => other,
                    });
                }
            }
        }

        let (min, max) = (self.min_resolution, self.max_resolution);
        for (tier, over) in self.tiers.iter_mut() {
            if let Some(res) = over.resolution {
                if !res.is_power_of_two() || res < min || res > max {
                    log::warn!("tier {:?} resolution {} outside {}..={}, dropped", tier, res, min, max);
                    repaired.push(LightingError::invalid_settings(
                        format!("{:?}", tier),
                        format!("resolution {} not a power of two in {}..={}", res, min, max),
                    ));
                    over.resolution = None;
                }
            }
            if over.update_rate == Some(UpdateRate::Fps(0)) {
                repaired.push(LightingError::invalid_settings(format!("{:?}", tier), "update rate of 0 fps"));
                over.update_rate = Some(UpdateRate::Always);
            }
        }

        repaired
    }

    /// Pick the system entry for a detail level.
    ///
    /// The entry with the highest level not above `detail_level` wins; with no
    /// candidate the default entry is used.
    pub fn select(&self, lods: &[ShadowSettingsLod], detail_level: i32) -> (String, ShadowSettingsSystem) {
        let best = lods
            .iter()
            .filter(|lod| lod.level <= detail_level && self.entries.contains_key(&lod.name))
            .min_by_key(|lod| detail_level - lod.level);

        if let Some(lod) = best {
            if let Some(settings) = self.entries.get(&lod.name) {
                return (lod.name.clone(), settings.clone());
            }
        }

        match self.entries.get(&self.default_name) {
            Some(settings) => (self.default_name.clone(), settings.clone()),
            None => (self.default_name.clone(), ShadowSettingsSystem::default()),
        }
    }

    /// Resolution for a combined adjustment and tier, before overrides
    pub fn computed_resolution(&self, adjust: i32, tier: LodTier) -> u32 {
        let max = self.max_resolution.max(self.min_resolution).max(1);
        let min = self.min_resolution.min(max);
        let max_log = 31 - max.leading_zeros() as i32;
        let shift = (adjust + tier.resolution_shift() as i32).clamp(0, max_log);
        (1u32 << (max_log - shift)).clamp(min, max)
    }

    /// Merge the three tiers into final settings
    pub fn resolve(
        &self,
        lods: &[ShadowSettingsLod],
        detail_level: i32,
        light: &ShadowSettingsLight,
        tier: LodTier,
    ) -> ShadowSettings {
        let (name, system) = self.select(lods, detail_level);
        let over = self.tiers.get(&tier).cloned().unwrap_or_default();

        let resolution = match over.resolution {
            Some(res) => res,
            None => self.computed_resolution(system.resolution_adjust + light.resolution_adjust, tier),
        };
        let update_rate = over
            .update_rate
            .or(light.update_rate)
            .unwrap_or(system.update_rate);
        let filter_quality = over.filter_quality.unwrap_or(match system.primary_samples {
            0..=4 => FilterQuality::Low,
            5..=8 => FilterQuality::Medium,
            _ => FilterQuality::High,
        });
        let formats = self
            .formats
            .get(&name)
            .copied()
            .unwrap_or_else(|| ResolvedFormats::assume_supported(&system));

        ShadowSettings {
            name,
            system,
            light: light.clone(),
            tier,
            resolution,
            filter_quality,
            update_rate,
            formats,
        }
    }
}
