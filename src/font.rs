//! Bitmap fonts laid out as glyph rows separated by a key colour.
//!
//! The atlas image has a gutter of key-coloured pixels around every glyph. The first non-key pixel
//! (scanning rows top to bottom) fixes the horizontal gutter width and the row gap; the run of
//! non-key pixels below it fixes the glyph height. Glyphs are then read left to right, row by row,
//! and assigned consecutive codepoints starting at `first_char`.

use image::RgbaImage;

use crate::draw::Rect;
use crate::mesh::ResourceLoadError;
use crate::text::GlyphMetrics;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glyph {
    pub codepoint: char,
    /// Source rectangle in atlas pixels.
    pub rect: Rect,
}

#[derive(Debug, Clone)]
pub struct FontAtlas {
    image: RgbaImage,
    glyphs: Vec<Glyph>,
    first_char: u32,
    base_size: f32,
}

impl FontAtlas {
    /// Scans `image` for glyph boxes and clears key-coloured pixels to transparent.
    pub fn from_image(
        mut image: RgbaImage,
        first_char: u32,
        key_color: [u8; 4],
    ) -> Result<Self, ResourceLoadError> {
        let (width, height) = image.dimensions();
        let is_key = |img: &RgbaImage, x: u32, y: u32| img.get_pixel(x, y).0 == key_color;

        let mut origin = None;
        'rows: for y in 0..height {
            for x in 0..width {
                if !is_key(&image, x, y) {
                    origin = Some((x, y));
                    break 'rows;
                }
            }
        }
        let (char_spacing, line_spacing) =
            origin.ok_or_else(|| ResourceLoadError::InvalidFont("atlas contains only key colour".into()))?;

        let mut char_height = 0;
        while line_spacing + char_height < height
            && !is_key(&image, char_spacing, line_spacing + char_height)
        {
            char_height += 1;
        }

        let mut glyphs = Vec::new();
        let mut row = 0;
        while line_spacing + row * (char_height + line_spacing) < height {
            let y = line_spacing + row * (char_height + line_spacing);
            let mut x = char_spacing;
            while x < width && !is_key(&image, x, y) {
                let mut char_width = 0;
                while x + char_width < width && !is_key(&image, x + char_width, y) {
                    char_width += 1;
                }
                let Some(codepoint) = char::from_u32(first_char + glyphs.len() as u32) else {
                    break;
                };
                glyphs.push(Glyph {
                    codepoint,
                    rect: Rect::new(x as f32, y as f32, char_width as f32, char_height as f32),
                });
                x += char_width + char_spacing;
            }
            row += 1;
        }
        if glyphs.is_empty() {
            return Err(ResourceLoadError::InvalidFont("no glyphs found in atlas".into()));
        }

        for pixel in image.pixels_mut() {
            if pixel.0 == key_color {
                pixel.0 = [0, 0, 0, 0];
            }
        }

        Ok(Self { image, glyphs, first_char, base_size: char_height as f32 })
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn glyphs(&self) -> &[Glyph] {
        &self.glyphs
    }

    /// Falls back to `?` for codepoints outside the atlas.
    pub fn glyph(&self, ch: char) -> Option<&Glyph> {
        self.lookup(ch).or_else(|| self.lookup('?'))
    }

    fn lookup(&self, ch: char) -> Option<&Glyph> {
        let index = (ch as u32).checked_sub(self.first_char)?;
        self.glyphs.get(index as usize)
    }
}

impl GlyphMetrics for FontAtlas {
    fn base_size(&self) -> f32 {
        self.base_size
    }

    fn glyph_width(&self, ch: char) -> f32 {
        self.glyph(ch).map(|glyph| glyph.rect.width).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const KEY: [u8; 4] = [255, 0, 255, 255];

    /// Three glyphs of widths 3, 2, 4 and height 5 on one row; gutter of 1 px.
    fn synthetic_atlas() -> RgbaImage {
        let mut image = RgbaImage::from_pixel(13, 7, Rgba(KEY));
        let mut x = 1;
        for width in [3u32, 2, 4] {
            for gx in x..x + width {
                for gy in 1..6 {
                    image.put_pixel(gx, gy, Rgba([0, 0, 0, 255]));
                }
            }
            x += width + 1;
        }
        image
    }

    #[test]
    fn scans_glyph_boxes_between_key_gutters() {
        let atlas = FontAtlas::from_image(synthetic_atlas(), 32, KEY).expect("atlas");
        assert_eq!(atlas.base_size(), 5.0);
        let widths: Vec<f32> = atlas.glyphs().iter().map(|g| g.rect.width).collect();
        assert_eq!(widths, vec![3.0, 2.0, 4.0]);
        assert_eq!(atlas.glyphs()[1].codepoint, '!');
        assert_eq!(atlas.glyphs()[2].rect.x, 8.0);
    }

    #[test]
    fn key_pixels_become_transparent() {
        let atlas = FontAtlas::from_image(synthetic_atlas(), 32, KEY).expect("atlas");
        assert_eq!(atlas.image().get_pixel(0, 0).0, [0, 0, 0, 0]);
        assert_eq!(atlas.image().get_pixel(1, 1).0, [0, 0, 0, 255]);
    }

    #[test]
    fn unknown_codepoints_have_no_width_without_fallback_glyph() {
        let atlas = FontAtlas::from_image(synthetic_atlas(), 32, KEY).expect("atlas");
        assert_eq!(atlas.glyph_width('~'), 0.0);
    }

    #[test]
    fn all_key_image_is_rejected() {
        let image = RgbaImage::from_pixel(4, 4, Rgba(KEY));
        assert!(matches!(FontAtlas::from_image(image, 32, KEY), Err(ResourceLoadError::InvalidFont(_))));
    }
}
