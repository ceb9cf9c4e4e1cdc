use image::{Rgb, RgbImage};
use std::fmt;
use std::path::Path;

use crate::config::ArchitectureConfig;
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Input,
    Conv,
    Pool,
    Flatten,
    Dense,
    Dropout,
}

/// One row of the model summary table.
#[derive(Debug, Clone)]
pub struct LayerSummary {
    pub name: String,
    pub kind: LayerKind,
    pub output_shape: Vec<usize>,
    pub params: usize,
}

impl LayerSummary {
    fn units(&self) -> usize {
        self.output_shape.iter().product()
    }
}

/// Traceable description of the recognizer: the ordered layer list with
/// per-layer output shapes and parameter counts, derived from the
/// architecture configuration.
#[derive(Debug, Clone)]
pub struct ModelSummary {
    layers: Vec<LayerSummary>,
}

impl ModelSummary {
    pub fn new(architecture: &ArchitectureConfig) -> Self {
        let mut layers = Vec::new();

        let mut height = architecture.image_height;
        let mut width = architecture.image_width;
        let mut channels = architecture.image_channels;

        layers.push(LayerSummary {
            name: "input".into(),
            kind: LayerKind::Input,
            output_shape: vec![channels, height, width],
            params: 0,
        });

        for (i, block) in architecture.conv_blocks.iter().enumerate() {
            let kernel = block.kernel_size;
            layers.push(LayerSummary {
                name: format!("conv2d_{}", i + 1),
                kind: LayerKind::Conv,
                output_shape: vec![block.filters, height, width],
                params: channels * block.filters * kernel * kernel + block.filters,
            });
            channels = block.filters;

            height /= 2;
            width /= 2;
            layers.push(LayerSummary {
                name: format!("max_pool2d_{}", i + 1),
                kind: LayerKind::Pool,
                output_shape: vec![channels, height, width],
                params: 0,
            });
        }

        let flattened = channels * height * width;
        layers.push(LayerSummary {
            name: "flatten".into(),
            kind: LayerKind::Flatten,
            output_shape: vec![flattened],
            params: 0,
        });

        layers.push(LayerSummary {
            name: "dense".into(),
            kind: LayerKind::Dense,
            output_shape: vec![architecture.dense_units],
            params: flattened * architecture.dense_units + architecture.dense_units,
        });

        layers.push(LayerSummary {
            name: "dropout".into(),
            kind: LayerKind::Dropout,
            output_shape: vec![architecture.dense_units],
            params: 0,
        });

        layers.push(LayerSummary {
            name: "head".into(),
            kind: LayerKind::Dense,
            output_shape: vec![architecture.num_classes],
            params: architecture.dense_units * architecture.num_classes
                + architecture.num_classes,
        });

        Self { layers }
    }

    pub fn layers(&self) -> &[LayerSummary] {
        &self.layers
    }

    pub fn total_params(&self) -> usize {
        self.layers.iter().map(|l| l.params).sum()
    }

    /// Renders the layer stack as a block diagram PNG: one rectangle per
    /// layer (width scaled to its output size, color keyed to the layer
    /// kind, conv stages inset inside a stage frame), connected top to
    /// bottom.
    pub fn render_plot(&self, path: &Path) -> Result<()> {
        const IMG_WIDTH: u32 = 480;
        const BLOCK_HEIGHT: u32 = 36;
        const GAP: u32 = 22;
        const MARGIN: u32 = 28;

        let n = self.layers.len() as u32;
        let img_height = 2 * MARGIN + n * BLOCK_HEIGHT + (n - 1) * GAP;
        let mut img = RgbImage::from_pixel(IMG_WIDTH, img_height, Rgb([255, 255, 255]));

        let max_units = self
            .layers
            .iter()
            .map(|l| l.units())
            .max()
            .unwrap_or(1)
            .max(1);

        let mut prev_bottom_center: Option<(u32, u32)> = None;
        for (i, layer) in self.layers.iter().enumerate() {
            let top = MARGIN + i as u32 * (BLOCK_HEIGHT + GAP);

            // Width scales with sqrt of the layer's output size so the
            // dense tail stays visible next to the conv stages.
            let ratio = (layer.units() as f64 / max_units as f64).sqrt();
            let block_width = (80.0 + ratio * (IMG_WIDTH as f64 - 2.0 * MARGIN as f64 - 80.0))
                as u32;
            let left = (IMG_WIDTH - block_width) / 2;

            let fill = layer_color(layer.kind);
            fill_rect(&mut img, left, top, block_width, BLOCK_HEIGHT, fill);
            stroke_rect(&mut img, left, top, block_width, BLOCK_HEIGHT, Rgb([40, 40, 40]));

            // Nested marker: conv/pool blocks get an inner frame showing
            // they belong to a conv stage.
            if matches!(layer.kind, LayerKind::Conv | LayerKind::Pool) {
                stroke_rect(
                    &mut img,
                    left + 4,
                    top + 4,
                    block_width - 8,
                    BLOCK_HEIGHT - 8,
                    Rgb([90, 90, 90]),
                );
            }

            if let Some((px, py)) = prev_bottom_center {
                draw_vertical_line(&mut img, px, py, top, Rgb([40, 40, 40]));
            }
            prev_bottom_center = Some((IMG_WIDTH / 2, top + BLOCK_HEIGHT));
        }

        img.save(path)
            .map_err(|e| PipelineError::Report(format!("failed to write model plot: {e}")))?;
        Ok(())
    }
}

impl fmt::Display for ModelSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<24} {:<20} {:>12}", "Layer (type)", "Output Shape", "Param #")?;
        writeln!(f, "{}", "=".repeat(58))?;
        for layer in &self.layers {
            let shape = format!("{:?}", layer.output_shape);
            let name = format!("{} ({:?})", layer.name, layer.kind);
            writeln!(f, "{name:<24} {shape:<20} {:>12}", layer.params)?;
        }
        writeln!(f, "{}", "=".repeat(58))?;
        write!(f, "Total params: {}", self.total_params())
    }
}

fn layer_color(kind: LayerKind) -> Rgb<u8> {
    match kind {
        LayerKind::Input => Rgb([137, 191, 137]),
        LayerKind::Conv => Rgb([121, 158, 209]),
        LayerKind::Pool => Rgb([140, 199, 204]),
        LayerKind::Flatten => Rgb([222, 222, 222]),
        LayerKind::Dense => Rgb([232, 178, 120]),
        LayerKind::Dropout => Rgb([200, 200, 200]),
    }
}

fn fill_rect(img: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) {
    for yy in y..(y + h).min(img.height()) {
        for xx in x..(x + w).min(img.width()) {
            img.put_pixel(xx, yy, color);
        }
    }
}

fn stroke_rect(img: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) {
    for xx in x..(x + w).min(img.width()) {
        img.put_pixel(xx, y, color);
        img.put_pixel(xx, (y + h - 1).min(img.height() - 1), color);
    }
    for yy in y..(y + h).min(img.height()) {
        img.put_pixel(x, yy, color);
        img.put_pixel((x + w - 1).min(img.width() - 1), yy, color);
    }
}

fn draw_vertical_line(img: &mut RgbImage, x: u32, y0: u32, y1: u32, color: Rgb<u8>) {
    for y in y0..y1.min(img.height()) {
        img.put_pixel(x, y, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn param_counts_match_hand_calculation() {
        let summary = ModelSummary::new(&ArchitectureConfig::default());

        // conv1: 1*32*3*3 + 32, conv2: 32*64*3*3 + 64,
        // dense: 3136*128 + 128, head: 128*10 + 10.
        let expected = (288 + 32) + (18_432 + 64) + (3136 * 128 + 128) + (1280 + 10);
        assert_eq!(summary.total_params(), expected);
    }

    #[test]
    fn display_lists_every_layer() {
        let summary = ModelSummary::new(&ArchitectureConfig::default());
        let text = summary.to_string();
        for name in ["input", "conv2d_1", "max_pool2d_2", "flatten", "dense", "head"] {
            assert!(text.contains(name), "missing layer {name} in summary");
        }
        assert!(text.contains("Total params"));
    }

    #[test]
    fn render_plot_writes_png() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model_plot.png");
        let summary = ModelSummary::new(&ArchitectureConfig::default());
        summary.render_plot(&path).unwrap();
        assert!(path.is_file());
    }
}
