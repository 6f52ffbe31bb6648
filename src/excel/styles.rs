//! Cell formats by role
//!
//! All colors and font sizes used by the exporter come from [`StyleConfig`].

use crate::model::plan::StyleRole;
use crate::types::ValueFormat;
use rust_xlsxwriter::{Color, ConditionalFormat3ColorScale, Format, FormatAlign, FormatBorder};

#[derive(Debug, Clone, PartialEq)]
pub struct StyleConfig {
    /// Banner and header fill
    pub banner_fill: u32,
    /// Section banner fill on the calculation sheet
    pub section_fill: u32,
    pub banner_font: u32,
    pub title_size: f64,
    pub heading_size: f64,
    /// Color scale endpoints: low, middle, high
    pub scale_low: u32,
    pub scale_mid: u32,
    pub scale_high: u32,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            banner_fill: 0x134074,
            section_fill: 0xD9D9D9,
            banner_font: 0xFFFFFF,
            title_size: 14.0,
            heading_size: 12.0,
            scale_low: 0xF8696B,
            scale_mid: 0xFFEB84,
            scale_high: 0x63BE7B,
        }
    }
}

impl StyleConfig {
    /// Concrete format for a style role
    pub fn format(&self, role: StyleRole) -> Format {
        match role {
            StyleRole::Title => Format::new()
                .set_bold()
                .set_font_size(self.title_size)
                .set_font_color(Color::RGB(self.banner_font))
                .set_background_color(Color::RGB(self.banner_fill))
                .set_align(FormatAlign::Center),
            StyleRole::CategoryBanner | StyleRole::ColumnHeader => Format::new()
                .set_bold()
                .set_font_color(Color::RGB(self.banner_font))
                .set_background_color(Color::RGB(self.banner_fill))
                .set_align(FormatAlign::Center),
            StyleRole::SectionBanner => Format::new()
                .set_bold()
                .set_background_color(Color::RGB(self.section_fill)),
            StyleRole::Heading => Format::new()
                .set_bold()
                .set_font_size(self.heading_size)
                .set_font_color(Color::RGB(self.banner_fill)),
            StyleRole::Label => Format::new().set_bold(),
            StyleRole::Text => Format::new(),
            StyleRole::Value(format) => value_format(format),
            StyleRole::Metric(format) => value_format(format)
                .set_bold()
                .set_border(FormatBorder::Thin),
        }
    }

    pub fn color_scale(&self) -> ConditionalFormat3ColorScale {
        ConditionalFormat3ColorScale::new()
            .set_minimum_color(Color::RGB(self.scale_low))
            .set_midpoint_color(Color::RGB(self.scale_mid))
            .set_maximum_color(Color::RGB(self.scale_high))
    }
}

fn value_format(format: ValueFormat) -> Format {
    Format::new().set_num_format(format.num_format())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_roles_carry_number_format() {
        let styles = StyleConfig::default();
        assert_eq!(
            styles.format(StyleRole::Value(ValueFormat::Percent)),
            Format::new().set_num_format("0.0%")
        );
        assert_eq!(
            styles.format(StyleRole::Value(ValueFormat::Date)),
            Format::new().set_num_format("yyyy-mm-dd")
        );
    }

    #[test]
    fn test_banner_roles_differ() {
        let styles = StyleConfig::default();
        assert_ne!(
            styles.format(StyleRole::SectionBanner),
            styles.format(StyleRole::CategoryBanner)
        );
        assert_eq!(styles.format(StyleRole::Label), Format::new().set_bold());
    }
}
