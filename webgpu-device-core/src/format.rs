//! Format table.
//!
//! A full per-format metadata table: aspect mask, per-aspect base component
//! type, component count, supported sample-type bitmask, and the base↔view
//! sRGB alias pair.

use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Aspects: u8 {
        const COLOR   = 0b001;
        const DEPTH   = 0b010;
        const STENCIL = 0b100;
    }
}

bitflags! {
    /// Which `TextureSampleType`s a format may be bound with in a shader.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct SampleTypes: u8 {
        const FLOAT           = 0b00001;
        const UNFILTERABLE    = 0b00010;
        const DEPTH           = 0b00100;
        const SINT            = 0b01000;
        const UINT            = 0b10000;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComponentType {
    Float,
    Sint,
    Uint,
    Depth,
    Stencil,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[non_exhaustive]
pub enum TextureFormat {
    R8Unorm,
    Rg8Unorm,
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgb10a2Unorm,
    R16Unorm,
    R16Float,
    Rg16Unorm,
    Rg16Float,
    Rgba16Unorm,
    Rgba16Float,
    R32Float,
    Rg32Float,
    Rgba32Float,
    R32Uint,
    Rg32Uint,
    Rgba32Uint,
    Depth16Unorm,
    Depth32Float,
    Stencil8Uint,
    Depth32FloatStencil8Uint,
}

#[derive(Clone, Copy, Debug)]
pub struct FormatInfo {
    pub format: TextureFormat,
    pub aspects: Aspects,
    /// Base component type, one per aspect bit set in `aspects`, in
    /// `COLOR, DEPTH, STENCIL` order.
    pub component_types: &'static [ComponentType],
    pub component_count: u8,
    pub sample_types: SampleTypes,
    /// The other member of this format's sRGB base/view alias pair, if any.
    pub srgb_alias: Option<TextureFormat>,
}

#[derive(Debug, thiserror::Error)]
#[error("texture format {0:?} is not supported by this device")]
pub struct UnsupportedFormat(pub TextureFormat);

macro_rules! f {
    ($format:expr, $aspects:expr, [$($ct:expr),*], $count:expr, $sample:expr, $alias:expr) => {
        FormatInfo {
            format: $format,
            aspects: $aspects,
            component_types: &[$($ct),*],
            component_count: $count,
            sample_types: $sample,
            srgb_alias: $alias,
        }
    };
}

const TABLE: &[FormatInfo] = &[
    f!(TextureFormat::R8Unorm, Aspects::COLOR, [ComponentType::Float], 1, SampleTypes::FLOAT.union(SampleTypes::UNFILTERABLE), None),
    f!(TextureFormat::Rg8Unorm, Aspects::COLOR, [ComponentType::Float], 2, SampleTypes::FLOAT.union(SampleTypes::UNFILTERABLE), None),
    f!(TextureFormat::Rgba8Unorm, Aspects::COLOR, [ComponentType::Float], 4, SampleTypes::FLOAT.union(SampleTypes::UNFILTERABLE), Some(TextureFormat::Rgba8UnormSrgb)),
    f!(TextureFormat::Rgba8UnormSrgb, Aspects::COLOR, [ComponentType::Float], 4, SampleTypes::FLOAT, Some(TextureFormat::Rgba8Unorm)),
    f!(TextureFormat::Bgra8Unorm, Aspects::COLOR, [ComponentType::Float], 4, SampleTypes::FLOAT.union(SampleTypes::UNFILTERABLE), Some(TextureFormat::Bgra8UnormSrgb)),
    f!(TextureFormat::Bgra8UnormSrgb, Aspects::COLOR, [ComponentType::Float], 4, SampleTypes::FLOAT, Some(TextureFormat::Bgra8Unorm)),
    f!(TextureFormat::Rgb10a2Unorm, Aspects::COLOR, [ComponentType::Float], 4, SampleTypes::FLOAT, None),
    f!(TextureFormat::R16Unorm, Aspects::COLOR, [ComponentType::Float], 1, SampleTypes::FLOAT, None),
    f!(TextureFormat::R16Float, Aspects::COLOR, [ComponentType::Float], 1, SampleTypes::FLOAT, None),
    f!(TextureFormat::Rg16Unorm, Aspects::COLOR, [ComponentType::Float], 2, SampleTypes::FLOAT, None),
    f!(TextureFormat::Rg16Float, Aspects::COLOR, [ComponentType::Float], 2, SampleTypes::FLOAT, None),
    f!(TextureFormat::Rgba16Unorm, Aspects::COLOR, [ComponentType::Float], 4, SampleTypes::FLOAT, None),
    f!(TextureFormat::Rgba16Float, Aspects::COLOR, [ComponentType::Float], 4, SampleTypes::FLOAT, None),
    f!(TextureFormat::R32Float, Aspects::COLOR, [ComponentType::Float], 1, SampleTypes::UNFILTERABLE, None),
    f!(TextureFormat::Rg32Float, Aspects::COLOR, [ComponentType::Float], 2, SampleTypes::UNFILTERABLE, None),
    f!(TextureFormat::Rgba32Float, Aspects::COLOR, [ComponentType::Float], 4, SampleTypes::UNFILTERABLE, None),
    f!(TextureFormat::R32Uint, Aspects::COLOR, [ComponentType::Uint], 1, SampleTypes::UINT, None),
    f!(TextureFormat::Rg32Uint, Aspects::COLOR, [ComponentType::Uint], 2, SampleTypes::UINT, None),
    f!(TextureFormat::Rgba32Uint, Aspects::COLOR, [ComponentType::Uint], 4, SampleTypes::UINT, None),
    f!(TextureFormat::Depth16Unorm, Aspects::DEPTH, [ComponentType::Depth], 1, SampleTypes::DEPTH, None),
    f!(TextureFormat::Depth32Float, Aspects::DEPTH, [ComponentType::Depth], 1, SampleTypes::DEPTH, None),
    f!(TextureFormat::Stencil8Uint, Aspects::STENCIL, [ComponentType::Stencil], 1, SampleTypes::UINT, None),
    f!(TextureFormat::Depth32FloatStencil8Uint, Aspects::DEPTH.union(Aspects::STENCIL), [ComponentType::Depth, ComponentType::Stencil], 2, SampleTypes::DEPTH, None),
];

/// Formats the buffer→texture blit helper must support, in a fixed order so
/// the key stays stable across builds.
pub const BUFFER_TO_TEXTURE_BLIT_FORMATS: &[TextureFormat] = &[
    TextureFormat::R8Unorm,
    TextureFormat::Rg8Unorm,
    TextureFormat::Rgba8Unorm,
    TextureFormat::Bgra8Unorm,
    TextureFormat::Rgb10a2Unorm,
    TextureFormat::R16Float,
    TextureFormat::R16Unorm,
    TextureFormat::Rg16Float,
    TextureFormat::Rg16Unorm,
    TextureFormat::Rgba16Float,
    TextureFormat::Rgba16Unorm,
    TextureFormat::R32Float,
    TextureFormat::Rg32Float,
    TextureFormat::Rgba32Float,
];

/// Source formats `copy_for_browser` accepts.
pub const COPY_FOR_BROWSER_SOURCE_FORMATS: &[TextureFormat] = &[
    TextureFormat::Bgra8Unorm,
    TextureFormat::Rgba8Unorm,
    TextureFormat::Rgba16Float,
];

pub fn get_format(format: TextureFormat) -> Result<&'static FormatInfo, UnsupportedFormat> {
    TABLE
        .iter()
        .find(|info| info.format == format)
        .ok_or(UnsupportedFormat(format))
}
