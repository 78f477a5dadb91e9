//! Concrete built-in plugins, always registered regardless of the
//! discovered directory tree . Grounded on the teacher's
//! `compositor.rs` blend-mode math for per-pixel work, reworked to the
//! u8 RGB domain and parallelized with `rayon` the way the teacher's
//! waveform/melspec code processes sample buffers chunk-wise.

use rand::Rng;
use rayon::prelude::*;

use crate::frame::Frame;
use crate::plugin::{Effect, Generator, PluginKind, PluginMetadata, ResolvedParams, Transition};
use crate::value::{ParamSpec, ParamSchema, ParamTag, ParamValue};

pub fn builtin_metadata() -> Vec<PluginMetadata> {
    vec![
        PluginMetadata {
            id: "invert".into(),
            display_name: "Invert".into(),
            kind: PluginKind::Effect,
            version: "1.0.0".into(),
            description: "Inverts every channel of every pixel.".into(),
            schema: ParamSchema::default(),
            backed_by: None,
        },
        PluginMetadata {
            id: "grayscale".into(),
            display_name: "Grayscale".into(),
            kind: PluginKind::Effect,
            version: "1.0.0".into(),
            description: "Desaturates the frame by luminance.".into(),
            schema: ParamSchema::default(),
            backed_by: None,
        },
        PluginMetadata {
            id: "box_blur".into(),
            display_name: "Box Blur".into(),
            kind: PluginKind::Effect,
            version: "1.0.0".into(),
            description: "Averages each pixel with its neighborhood.".into(),
            schema: ParamSchema::new(vec![ParamSpec {
                name: "radius".into(),
                tag: ParamTag::Int,
                default: ParamValue::Int(1),
                range: Some((1.0, 8.0)),
                options: vec![],
            }]),
            backed_by: None,
        },
        MetadataBuilder::mirror(),
        MetadataBuilder::brightness(),
        MetadataBuilder::hue_rotate(),
        MetadataBuilder::gamma(),
        MetadataBuilder::solid_color(),
        MetadataBuilder::test_pattern(),
        MetadataBuilder::gradient(),
        MetadataBuilder::noise(),
        MetadataBuilder::crossfade(),
        MetadataBuilder::cut(),
        MetadataBuilder::wipe(),
    ]
}

struct MetadataBuilder;
impl MetadataBuilder {
    fn mirror() -> PluginMetadata {
        PluginMetadata {
            id: "mirror".into(),
            display_name: "Mirror".into(),
            kind: PluginKind::Effect,
            version: "1.0.0".into(),
            description: "Mirrors the left half of the frame onto the right half.".into(),
            schema: ParamSchema::default(),
            backed_by: None,
        }
    }

    fn brightness() -> PluginMetadata {
        PluginMetadata {
            id: "brightness".into(),
            display_name: "Brightness".into(),
            kind: PluginKind::Effect,
            version: "1.0.0".into(),
            description: "In-place multiply of every channel, clipped to [0, 255].".into(),
            schema: ParamSchema::new(vec![ParamSpec {
                name: "factor".into(),
                tag: ParamTag::Float,
                default: ParamValue::Float(1.0),
                range: Some((0.0, 4.0)),
                options: vec![],
            }]),
            backed_by: None,
        }
    }

    fn hue_rotate() -> PluginMetadata {
        PluginMetadata {
            id: "hue_rotate".into(),
            display_name: "Hue Rotate".into(),
            kind: PluginKind::Effect,
            version: "1.0.0".into(),
            description: "Rotates hue by a number of degrees on the 0..180 H channel.".into(),
            schema: ParamSchema::new(vec![ParamSpec {
                name: "shift".into(),
                tag: ParamTag::Int,
                default: ParamValue::Int(0),
                range: Some((-180.0, 180.0)),
                options: vec![],
            }]),
            backed_by: None,
        }
    }

    fn gamma() -> PluginMetadata {
        PluginMetadata {
            id: "gamma".into(),
            display_name: "Gamma".into(),
            kind: PluginKind::Effect,
            version: "1.0.0".into(),
            description: "Per-channel power-law correction.".into(),
            schema: ParamSchema::new(vec![ParamSpec {
                name: "gamma".into(),
                tag: ParamTag::Float,
                default: ParamValue::Float(1.0),
                range: Some((0.1, 4.0)),
                options: vec![],
            }]),
            backed_by: None,
        }
    }

    fn solid_color() -> PluginMetadata {
        PluginMetadata {
            id: "solid_color".into(),
            display_name: "Solid Color".into(),
            kind: PluginKind::Generator,
            version: "1.0.0".into(),
            description: "A constant-color frame.".into(),
            schema: ParamSchema::new(vec![ParamSpec {
                name: "color".into(),
                tag: ParamTag::Color,
                default: ParamValue::Color(255, 255, 255),
                range: None,
                options: vec![],
            }]),
            backed_by: None,
        }
    }

    fn test_pattern() -> PluginMetadata {
        PluginMetadata {
            id: "test_pattern".into(),
            display_name: "Test Pattern".into(),
            kind: PluginKind::Generator,
            version: "1.0.0".into(),
            description: "Color bars for verifying canvas orientation and channel order.".into(),
            schema: ParamSchema::default(),
            backed_by: None,
        }
    }

    fn gradient() -> PluginMetadata {
        PluginMetadata {
            id: "gradient".into(),
            display_name: "Gradient".into(),
            kind: PluginKind::Generator,
            version: "1.0.0".into(),
            description: "A horizontal gradient between two colors, animated by time.".into(),
            schema: ParamSchema::new(vec![
                ParamSpec {
                    name: "from".into(),
                    tag: ParamTag::Color,
                    default: ParamValue::Color(0, 0, 0),
                    range: None,
                    options: vec![],
                },
                ParamSpec {
                    name: "to".into(),
                    tag: ParamTag::Color,
                    default: ParamValue::Color(255, 255, 255),
                    range: None,
                    options: vec![],
                },
                ParamSpec {
                    name: "speed".into(),
                    tag: ParamTag::Float,
                    default: ParamValue::Float(0.0),
                    range: Some((-10.0, 10.0)),
                    options: vec![],
                },
            ]),
            backed_by: None,
        }
    }

    fn noise() -> PluginMetadata {
        PluginMetadata {
            id: "noise".into(),
            display_name: "Noise".into(),
            kind: PluginKind::Generator,
            version: "1.0.0".into(),
            description: "Independent per-pixel random noise, reseeded every frame.".into(),
            schema: ParamSchema::default(),
            backed_by: None,
        }
    }

    fn crossfade() -> PluginMetadata {
        PluginMetadata {
            id: "crossfade".into(),
            display_name: "Crossfade".into(),
            kind: PluginKind::Transition,
            version: "1.0.0".into(),
            description: "Linearly interpolates between two frames by progress.".into(),
            schema: ParamSchema::default(),
            backed_by: None,
        }
    }

    fn cut() -> PluginMetadata {
        PluginMetadata {
            id: "cut".into(),
            display_name: "Cut".into(),
            kind: PluginKind::Transition,
            version: "1.0.0".into(),
            description: "Zero blend: pass through frame B unconditionally.".into(),
            schema: ParamSchema::default(),
            backed_by: None,
        }
    }

    fn wipe() -> PluginMetadata {
        PluginMetadata {
            id: "wipe".into(),
            display_name: "Wipe".into(),
            kind: PluginKind::Transition,
            version: "1.0.0".into(),
            description: "Reveals frame B left-to-right as progress advances.".into(),
            schema: ParamSchema::default(),
            backed_by: None,
        }
    }
}

pub fn create_effect(id: &str) -> Option<Box<dyn Effect>> {
    match id {
        "invert" => Some(Box::new(InvertEffect)),
        "grayscale" => Some(Box::new(GrayscaleEffect)),
        "box_blur" => Some(Box::new(BoxBlurEffect)),
        "mirror" => Some(Box::new(MirrorEffect)),
        "brightness" => Some(Box::new(BrightnessEffect)),
        "hue_rotate" => Some(Box::new(HueRotateEffect)),
        "gamma" => Some(Box::new(GammaEffect)),
        _ => None,
    }
}

pub fn create_generator(id: &str) -> Option<Box<dyn Generator>> {
    match id {
        "solid_color" => Some(Box::new(SolidGenerator)),
        "test_pattern" => Some(Box::new(TestPatternGenerator)),
        "gradient" => Some(Box::new(GradientGenerator)),
        "noise" => Some(Box::new(NoiseGenerator)),
        _ => None,
    }
}

pub fn create_transition(id: &str) -> Option<Box<dyn Transition>> {
    match id {
        "crossfade" => Some(Box::new(CrossfadeTransition)),
        "cut" => Some(Box::new(CutTransition)),
        "wipe" => Some(Box::new(WipeTransition)),
        _ => None,
    }
}

struct InvertEffect;
impl Effect for InvertEffect {
    fn process(&mut self, frame: &mut Frame, _params: &ResolvedParams) {
        frame
            .make_mut()
            .par_chunks_mut(3)
            .for_each(|px| {
                px[0] = 255 - px[0];
                px[1] = 255 - px[1];
                px[2] = 255 - px[2];
            });
    }
}

struct GrayscaleEffect;
impl Effect for GrayscaleEffect {
    fn process(&mut self, frame: &mut Frame, _params: &ResolvedParams) {
        frame.make_mut().par_chunks_mut(3).for_each(|px| {
            let lum = (0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32)
                .round()
                .clamp(0.0, 255.0) as u8;
            px[0] = lum;
            px[1] = lum;
            px[2] = lum;
        });
    }
}

struct BoxBlurEffect;
impl Effect for BoxBlurEffect {
    fn process(&mut self, frame: &mut Frame, params: &ResolvedParams) {
        let radius = params
            .get("radius")
            .and_then(|v| v.as_int())
            .unwrap_or(1)
            .max(1) as i64;
        let (w, h) = (frame.width as i64, frame.height as i64);
        let src = frame.as_bytes().to_vec();

        let out: Vec<u8> = (0..h)
            .into_par_iter()
            .flat_map(|y| {
                let mut row = vec![0u8; w as usize * 3];
                for x in 0..w {
                    let (mut r, mut g, mut b, mut n) = (0u32, 0u32, 0u32, 0u32);
                    for dy in -radius..=radius {
                        for dx in -radius..=radius {
                            let (sx, sy) = (x + dx, y + dy);
                            if sx < 0 || sy < 0 || sx >= w || sy >= h {
                                continue;
                            }
                            let idx = (sy as usize * w as usize + sx as usize) * 3;
                            r += src[idx] as u32;
                            g += src[idx + 1] as u32;
                            b += src[idx + 2] as u32;
                            n += 1;
                        }
                    }
                    let base = x as usize * 3;
                    row[base] = (r / n.max(1)) as u8;
                    row[base + 1] = (g / n.max(1)) as u8;
                    row[base + 2] = (b / n.max(1)) as u8;
                }
                row
            })
            .collect();

        *frame = Frame::new(frame.width, frame.height, out);
    }
}

struct MirrorEffect;
impl Effect for MirrorEffect {
    fn process(&mut self, frame: &mut Frame, _params: &ResolvedParams) {
        let (w, h) = (frame.width as usize, frame.height as usize);
        let half = w / 2;
        let data = frame.make_mut();
        for y in 0..h {
            let row = y * w * 3;
            for x in 0..half {
                let left = row + x * 3;
                let right = row + (w - 1 - x) * 3;
                data[right] = data[left];
                data[right + 1] = data[left + 1];
                data[right + 2] = data[left + 2];
            }
        }
    }
}

struct BrightnessEffect;
impl Effect for BrightnessEffect {
    fn process(&mut self, frame: &mut Frame, params: &ResolvedParams) {
        let factor = params.get("factor").and_then(|v| v.as_float()).unwrap_or(1.0) as f32;
        crate::compositor::apply_brightness(frame, factor);
    }
}

struct HueRotateEffect;
impl Effect for HueRotateEffect {
    fn process(&mut self, frame: &mut Frame, params: &ResolvedParams) {
        let shift = params.get("shift").and_then(|v| v.as_int()).unwrap_or(0) as i32;
        crate::compositor::apply_hue_shift(frame, shift);
    }
}

struct GammaEffect;
impl Effect for GammaEffect {
    fn process(&mut self, frame: &mut Frame, params: &ResolvedParams) {
        let gamma = params.get("gamma").and_then(|v| v.as_float()).unwrap_or(1.0) as f32;
        if (gamma - 1.0).abs() < f32::EPSILON {
            return;
        }
        let inv_gamma = 1.0 / gamma.max(0.01);
        frame.make_mut().par_iter_mut().for_each(|c| {
            let normalized = *c as f32 / 255.0;
            *c = (normalized.powf(inv_gamma) * 255.0).round().clamp(0.0, 255.0) as u8;
        });
    }
}

struct SolidGenerator;
impl Generator for SolidGenerator {
    fn produce(
        &mut self,
        _frame_number: u64,
        _time: f64,
        width: u32,
        height: u32,
        params: &ResolvedParams,
    ) -> Frame {
        let color = params
            .get("color")
            .and_then(|v| v.as_color())
            .unwrap_or((255, 255, 255));
        Frame::filled(width, height, color)
    }
}

/// Eight equal-width vertical bars cycling the primary/secondary colors,
/// the classic broadcast test card -- verifies canvas orientation and
/// Art-Net channel order end to end.
struct TestPatternGenerator;
impl Generator for TestPatternGenerator {
    fn produce(
        &mut self,
        _frame_number: u64,
        _time: f64,
        width: u32,
        height: u32,
        _params: &ResolvedParams,
    ) -> Frame {
        const BARS: [(u8, u8, u8); 8] = [
            (255, 255, 255),
            (255, 255, 0),
            (0, 255, 255),
            (0, 255, 0),
            (255, 0, 255),
            (255, 0, 0),
            (0, 0, 255),
            (0, 0, 0),
        ];
        let mut data = vec![0u8; width as usize * height as usize * 3];
        for x in 0..width as usize {
            let bar = (x * BARS.len() / width.max(1) as usize).min(BARS.len() - 1);
            let (r, g, b) = BARS[bar];
            for y in 0..height as usize {
                let idx = (y * width as usize + x) * 3;
                data[idx] = r;
                data[idx + 1] = g;
                data[idx + 2] = b;
            }
        }
        Frame::new(width, height, data)
    }
}

struct GradientGenerator;
impl Generator for GradientGenerator {
    fn produce(
        &mut self,
        _frame_number: u64,
        time: f64,
        width: u32,
        height: u32,
        params: &ResolvedParams,
    ) -> Frame {
        let from = params
            .get("from")
            .and_then(|v| v.as_color())
            .unwrap_or((0, 0, 0));
        let to = params
            .get("to")
            .and_then(|v| v.as_color())
            .unwrap_or((255, 255, 255));
        let speed = params.get("speed").and_then(|v| v.as_float()).unwrap_or(0.0);
        let offset = (time * speed).rem_euclid(1.0) as f32;

        let mut data = vec![0u8; width as usize * height as usize * 3];
        for x in 0..width as usize {
            let t = ((x as f32 / width.max(1) as f32) + offset).rem_euclid(1.0);
            let r = (from.0 as f32 + (to.0 as f32 - from.0 as f32) * t).round() as u8;
            let g = (from.1 as f32 + (to.1 as f32 - from.1 as f32) * t).round() as u8;
            let b = (from.2 as f32 + (to.2 as f32 - from.2 as f32) * t).round() as u8;
            for y in 0..height as usize {
                let idx = (y * width as usize + x) * 3;
                data[idx] = r;
                data[idx + 1] = g;
                data[idx + 2] = b;
            }
        }
        Frame::new(width, height, data)
    }
}

struct NoiseGenerator;
impl Generator for NoiseGenerator {
    fn produce(
        &mut self,
        _frame_number: u64,
        _time: f64,
        width: u32,
        height: u32,
        _params: &ResolvedParams,
    ) -> Frame {
        let mut rng = rand::thread_rng();
        let mut data = vec![0u8; width as usize * height as usize * 3];
        rng.fill(&mut data[..]);
        Frame::new(width, height, data)
    }
}

struct CrossfadeTransition;
impl Transition for CrossfadeTransition {
    fn blend(&mut self, a: &Frame, b: &Frame, progress: f32, _params: &ResolvedParams) -> Frame {
        let progress = progress.clamp(0.0, 1.0);
        let out: Vec<u8> = a
            .as_bytes()
            .par_iter()
            .zip(b.as_bytes().par_iter())
            .map(|(&av, &bv)| {
                (av as f32 + (bv as f32 - av as f32) * progress).round() as u8
            })
            .collect();
        Frame::new(a.width, a.height, out)
    }
}

struct CutTransition;
impl Transition for CutTransition {
    fn blend(&mut self, _a: &Frame, b: &Frame, _progress: f32, _params: &ResolvedParams) -> Frame {
        b.clone()
    }
}

struct WipeTransition;
impl Transition for WipeTransition {
    fn blend(&mut self, a: &Frame, b: &Frame, progress: f32, _params: &ResolvedParams) -> Frame {
        let progress = progress.clamp(0.0, 1.0);
        let (w, h) = (a.width as usize, a.height as usize);
        let split_x = (w as f32 * progress).round() as usize;
        let mut data = vec![0u8; w * h * 3];
        for y in 0..h {
            for x in 0..w {
                let idx = (y * w + x) * 3;
                let (r, g, bch) = if x < split_x { b.pixel(x as u32, y as u32) } else { a.pixel(x as u32, y as u32) };
                data[idx] = r;
                data[idx + 1] = g;
                data[idx + 2] = bch;
            }
        }
        Frame::new(a.width, a.height, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn invert_round_trips_to_original() {
        let mut frame = Frame::filled(2, 2, (10, 20, 30));
        let params = BTreeMap::new();
        InvertEffect.process(&mut frame, &params);
        assert_eq!(frame.pixel(0, 0), (245, 235, 225));
        InvertEffect.process(&mut frame, &params);
        assert_eq!(frame.pixel(0, 0), (10, 20, 30));
    }

    #[test]
    fn crossfade_at_zero_and_one_matches_endpoints() {
        let a = Frame::filled(2, 2, (0, 0, 0));
        let b = Frame::filled(2, 2, (200, 100, 50));
        let params = BTreeMap::new();
        let at0 = CrossfadeTransition.blend(&a, &b, 0.0, &params);
        let at1 = CrossfadeTransition.blend(&a, &b, 1.0, &params);
        assert_eq!(at0.pixel(0, 0), (0, 0, 0));
        assert_eq!(at1.pixel(0, 0), (200, 100, 50));
    }
}
