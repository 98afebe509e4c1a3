use image::{GrayImage, Luma};
use imageproc::definitions::Image;
use imageproc::integral_image::{integral_image, integral_squared_image};
use imageproc::template_matching::{match_template, MatchTemplateMethod};
use std::fs;
use std::path::Path;

use crate::error::{HighlightError, Result};
use crate::model::EventName;

pub(crate) const MATCH_THRESHOLD: f32 = 0.8;

/// An icon whose file stem names the event it signals.
#[derive(Debug, Clone)]
pub struct IconTemplate {
    pub name: EventName,
    pub image: GrayImage,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IconMatch {
    pub name: EventName,
    pub x: u32,
    pub y: u32,
    pub score: f32,
}

/// Loads `<event_name>.png` icons, skipping files whose stem is not an event.
pub fn load_templates(directory: &Path) -> Result<Vec<IconTemplate>> {
    let entries = fs::read_dir(directory).map_err(|error| HighlightError::io(directory, error))?;

    let mut templates = Vec::new();
    for entry in entries {
        let path = entry.map_err(|error| HighlightError::io(directory, error))?.path();
        if path.extension().and_then(|extension| extension.to_str()) != Some("png") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        let name = match stem.parse::<EventName>() {
            Ok(name) => name,
            Err(error) => {
                tracing::warn!(template = %path.display(), "Skipping template: {error}");
                continue;
            }
        };

        let image = image::open(&path)
            .map_err(|error| HighlightError::tool("image", format!("'{}': {error}", path.display())))?
            .to_luma8();
        templates.push(IconTemplate { name, image });
    }

    templates.sort_by_key(|template| template.name);
    tracing::debug!(directory = %directory.display(), count = templates.len(), "Loaded icon templates");
    Ok(templates)
}

/// Sum of `table` over the `width` x `height` window at `(x, y)`. Integral
/// images are one pixel larger than their source on each axis.
fn window_sum(table: &Image<Luma<u64>>, x: u32, y: u32, width: u32, height: u32) -> f64 {
    let corner = |x: u32, y: u32| table.get_pixel(x, y).0[0];
    let included = corner(x + width, y + height) + corner(x, y);
    let excluded = corner(x, y + height) + corner(x + width, y);
    (included - excluded) as f64
}

/// Zero-mean normalized cross-correlation of `template` at every position of
/// `region`, row-major. Empty when the template does not fit or is flat.
pub fn correlation_map(region: &GrayImage, template: &GrayImage) -> Vec<f32> {
    let (template_width, template_height) = template.dimensions();
    if template_width == 0
        || template_height == 0
        || template_width > region.width()
        || template_height > region.height()
    {
        return Vec::new();
    }

    let pixel_count = f64::from(template_width * template_height);
    let template_sum: f64 = template.pixels().map(|pixel| f64::from(pixel.0[0])).sum();
    let template_mean = template_sum / pixel_count;
    let template_energy: f64 = template
        .pixels()
        .map(|pixel| (f64::from(pixel.0[0]) - template_mean).powi(2))
        .sum();
    if template_energy <= f64::EPSILON {
        return Vec::new();
    }

    // sum((T - mean T) * I) = sum(T * I) - mean T * sum(I)
    let cross = match_template(region, template, MatchTemplateMethod::CrossCorrelation);
    let sums = integral_image::<_, u64>(region);
    let squares = integral_squared_image::<_, u64>(region);

    let (positions_x, positions_y) = cross.dimensions();
    let mut scores = Vec::with_capacity((positions_x * positions_y) as usize);
    for y in 0..positions_y {
        for x in 0..positions_x {
            let sum = window_sum(&sums, x, y, template_width, template_height);
            let square = window_sum(&squares, x, y, template_width, template_height);
            let window_energy = square - sum * sum / pixel_count;
            if window_energy <= f64::EPSILON {
                scores.push(0.0);
                continue;
            }

            let numerator = f64::from(cross.get_pixel(x, y).0[0]) - template_mean * sum;
            scores.push((numerator / (template_energy * window_energy).sqrt()) as f32);
        }
    }

    scores
}

/// Every occurrence of every template scoring at least `threshold`. Once an
/// occurrence is accepted, its footprint is masked so overlapping positions
/// are not reported again.
pub fn detect_icons(region: &GrayImage, templates: &[IconTemplate], threshold: f32) -> Vec<IconMatch> {
    let region_width = region.width() as usize;
    let region_height = region.height() as usize;
    let mut visited = vec![false; region_width * region_height];
    let mut matches = Vec::new();

    for template in templates {
        let scores = correlation_map(region, &template.image);
        if scores.is_empty() {
            continue;
        }
        let template_width = template.image.width() as usize;
        let template_height = template.image.height() as usize;
        let positions_x = region_width - template_width + 1;

        for (index, score) in scores.iter().enumerate() {
            let (x, y) = (index % positions_x, index / positions_x);
            if *score < threshold || visited[y * region_width + x] {
                continue;
            }

            for mask_y in y..(y + template_height).min(region_height) {
                for mask_x in x..(x + template_width).min(region_width) {
                    visited[mask_y * region_width + mask_x] = true;
                }
            }
            matches.push(IconMatch {
                name: template.name,
                x: x as u32,
                y: y as u32,
                score: *score,
            });
        }
    }

    matches
}
