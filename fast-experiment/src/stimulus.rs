use crate::config::{DesignConfig, GridConfig};
use crate::counterbalance::other_color_in_pair;
use crate::error::ConfigError;
use crate::shuffle::{shuffle, shuffled_indices};
use fast_core::{DistractorCounts, Frame, Primitive, Rgb, ScreenPoint, Shape};
use rand::Rng;

/// Which target feature a distractor keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistractorKind {
    /// Target shape in the pair's other color
    SameShapeOtherColor,
    /// Other shape in the target color
    OtherShapeSameColor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Target,
    Distractor(DistractorKind),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedItem {
    pub kind: ItemKind,
    pub shape: Shape,
    /// Palette index
    pub color: usize,
    pub cell: usize,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StimulusRequest {
    pub set_size: usize,
    pub has_target: bool,
    pub pair_index: usize,
    pub target_shape: Shape,
    pub target_color: usize,
}

/// One search display. `items` holds the `set_size` distractors followed by
/// the reserved slot (target or filler).
#[derive(Debug, Clone, PartialEq)]
pub struct Stimulus {
    pub items: Vec<PlacedItem>,
    /// Un-jittered center of the target cell, when a target was drawn
    pub target_position: Option<ScreenPoint>,
    pub distractors: DistractorCounts,
    pub filler: Option<DistractorKind>,
}

impl Stimulus {
    pub fn count(&self, kind: ItemKind) -> usize {
        self.items.iter().filter(|item| item.kind == kind).count()
    }

    pub fn target(&self) -> Option<&PlacedItem> {
        self.items.iter().find(|item| item.kind == ItemKind::Target)
    }

    pub fn to_primitives(&self, palette: &[Rgb], object_size: f32) -> Vec<Primitive> {
        self.items
            .iter()
            .filter_map(|item| {
                Some(Primitive {
                    shape: item.shape,
                    x: item.x,
                    y: item.y,
                    size: object_size,
                    color: *palette.get(item.color)?,
                })
            })
            .collect()
    }

    pub fn to_frame(&self, design: &DesignConfig) -> Frame {
        Frame::blank(design.grid.canvas_width, design.grid.canvas_height, design.background)
            .with_primitives(self.to_primitives(&design.palette, design.grid.object_size))
    }
}

pub struct StimulusGenerator<'a> {
    grid: &'a GridConfig,
    color_pairs: &'a [[usize; 2]],
}

impl<'a> StimulusGenerator<'a> {
    pub fn new(design: &'a DesignConfig) -> Self {
        Self {
            grid: &design.grid,
            color_pairs: &design.color_pairs,
        }
    }

    fn jitter<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        (rng.random::<f32>() - 0.5) * 2.0 * self.grid.jitter
    }

    fn place<R: Rng + ?Sized>(&self, kind: ItemKind, shape: Shape, color: usize, cell: usize, rng: &mut R) -> PlacedItem {
        let (cx, cy) = self.grid.cell_center(cell);
        PlacedItem {
            kind,
            shape,
            color,
            cell,
            x: cx + self.jitter(rng),
            y: cy + self.jitter(rng),
        }
    }

    pub fn create_stimulus<R: Rng + ?Sized>(&self, req: &StimulusRequest, rng: &mut R) -> Result<Stimulus, ConfigError> {
        let needed = req.set_size + 1;
        if self.grid.cell_count() < needed {
            return Err(ConfigError::GridTooSmall {
                cells: self.grid.cell_count(),
                needed,
            });
        }
        let pair = *self
            .color_pairs
            .get(req.pair_index)
            .ok_or(ConfigError::PaletteIndex {
                pair: req.pair_index,
                index: req.target_color,
                len: self.color_pairs.len(),
            })?;
        let other_color = other_color_in_pair(pair, req.target_color).ok_or(ConfigError::ColorNotInPair {
            color: req.target_color,
            pair: req.pair_index,
        })?;
        let other_shape = req.target_shape.other();

        let mut cells: Vec<usize> = (0..self.grid.cell_count()).collect();
        shuffle(&mut cells, rng);
        cells.truncate(needed);

        let n_a = req.set_size / 2;
        let n_b = req.set_size - n_a;
        let mut kinds = Vec::with_capacity(req.set_size);
        kinds.extend(std::iter::repeat_n(DistractorKind::SameShapeOtherColor, n_a));
        kinds.extend(std::iter::repeat_n(DistractorKind::OtherShapeSameColor, n_b));

        let features = |kind: DistractorKind| match kind {
            DistractorKind::SameShapeOtherColor => (req.target_shape, other_color),
            DistractorKind::OtherShapeSameColor => (other_shape, req.target_color),
        };

        let order = shuffled_indices(req.set_size, rng);
        let mut items = Vec::with_capacity(needed);
        for (slot, &pick) in order.iter().enumerate() {
            let kind = kinds[pick];
            let (shape, color) = features(kind);
            items.push(self.place(ItemKind::Distractor(kind), shape, color, cells[slot], rng));
        }

        let reserved = cells[req.set_size];
        let (target_position, filler) = if req.has_target {
            items.push(self.place(ItemKind::Target, req.target_shape, req.target_color, reserved, rng));
            let (x, y) = self.grid.cell_center(reserved);
            (Some(ScreenPoint { x, y }), None)
        } else {
            let kind = if req.set_size % 2 == 0 {
                DistractorKind::SameShapeOtherColor
            } else {
                DistractorKind::OtherShapeSameColor
            };
            let (shape, color) = features(kind);
            items.push(self.place(ItemKind::Distractor(kind), shape, color, reserved, rng));
            (None, Some(kind))
        };

        Ok(Stimulus {
            items,
            target_position,
            distractors: DistractorCounts {
                same_shape_other_color: n_a,
                other_shape_same_color: n_b,
            },
            filler,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn request(set_size: usize, has_target: bool) -> StimulusRequest {
        StimulusRequest {
            set_size,
            has_target,
            pair_index: 0,
            target_shape: Shape::Square,
            target_color: 0,
        }
    }

    #[test]
    fn present_display_has_one_target_and_balanced_distractors() {
        let design = DesignConfig::fast();
        let generator = StimulusGenerator::new(&design);
        let mut rng = StdRng::seed_from_u64(8);
        let s = generator.create_stimulus(&request(31, true), &mut rng).unwrap();

        assert_eq!(s.items.len(), 32);
        assert_eq!(s.count(ItemKind::Target), 1);
        assert_eq!(s.count(ItemKind::Distractor(DistractorKind::SameShapeOtherColor)), 15);
        assert_eq!(s.count(ItemKind::Distractor(DistractorKind::OtherShapeSameColor)), 16);
        assert_eq!(s.distractors.total(), 31);
        assert_eq!(s.filler, None);

        let target = s.target().unwrap();
        assert_eq!((target.shape, target.color), (Shape::Square, 0));
        let (cx, cy) = design.grid.cell_center(target.cell);
        assert_eq!(s.target_position, Some(ScreenPoint { x: cx, y: cy }));

        for item in &s.items {
            match item.kind {
                ItemKind::Distractor(DistractorKind::SameShapeOtherColor) => {
                    assert_eq!((item.shape, item.color), (Shape::Square, 3))
                }
                ItemKind::Distractor(DistractorKind::OtherShapeSameColor) => {
                    assert_eq!((item.shape, item.color), (Shape::Circle, 0))
                }
                ItemKind::Target => {}
            }
        }
    }

    #[test]
    fn items_occupy_distinct_cells_within_jitter() {
        let design = DesignConfig::fast();
        let generator = StimulusGenerator::new(&design);
        let mut rng = StdRng::seed_from_u64(21);
        for has_target in [true, false] {
            let s = generator.create_stimulus(&request(31, has_target), &mut rng).unwrap();
            let cells: HashSet<usize> = s.items.iter().map(|i| i.cell).collect();
            assert_eq!(cells.len(), 32);
            for item in &s.items {
                let (cx, cy) = design.grid.cell_center(item.cell);
                assert!((item.x - cx).abs() <= 8.0 && (item.y - cy).abs() <= 8.0);
            }
        }
    }

    #[test]
    fn counts_do_not_depend_on_the_seed() {
        let design = DesignConfig::fast();
        let generator = StimulusGenerator::new(&design);
        let kinds = [
            ItemKind::Target,
            ItemKind::Distractor(DistractorKind::SameShapeOtherColor),
            ItemKind::Distractor(DistractorKind::OtherShapeSameColor),
        ];
        for (set_size, has_target) in [(31, true), (31, false), (30, true), (30, false)] {
            let req = request(set_size, has_target);
            let first = generator.create_stimulus(&req, &mut StdRng::seed_from_u64(0)).unwrap();
            let mut layouts = HashSet::new();
            for seed in 0..12 {
                let s = generator.create_stimulus(&req, &mut StdRng::seed_from_u64(seed)).unwrap();
                assert_eq!(s.items.len(), set_size + 1);
                assert_eq!(s.distractors, first.distractors, "seed {seed}");
                assert_eq!(s.filler, first.filler, "seed {seed}");
                for kind in kinds {
                    assert_eq!(s.count(kind), first.count(kind), "seed {seed} {kind:?}");
                }
                layouts.insert(s.items.iter().map(|i| i.cell).collect::<Vec<_>>());
            }
            assert!(layouts.len() > 1, "layouts never changed for set size {set_size}");
        }
    }

    #[test]
    fn absent_filler_follows_set_size_parity() {
        let design = DesignConfig::fast();
        let generator = StimulusGenerator::new(&design);
        let mut rng = StdRng::seed_from_u64(2);

        let even = generator.create_stimulus(&request(30, false), &mut rng).unwrap();
        assert_eq!(even.filler, Some(DistractorKind::SameShapeOtherColor));
        assert_eq!(even.count(ItemKind::Target), 0);
        assert_eq!(even.items.len(), 31);
        assert_eq!(even.target_position, None);
        let filler = even.items.last().unwrap();
        assert_eq!((filler.shape, filler.color), (Shape::Square, 3));

        let odd = generator.create_stimulus(&request(31, false), &mut rng).unwrap();
        assert_eq!(odd.filler, Some(DistractorKind::OtherShapeSameColor));
        assert_eq!(odd.count(ItemKind::Distractor(DistractorKind::OtherShapeSameColor)), 17);
    }

    #[test]
    fn grid_too_small_is_rejected() {
        let mut design = DesignConfig::fast();
        design.grid.cols = 4;
        design.grid.rows = 4;
        let generator = StimulusGenerator::new(&design);
        let err = generator.create_stimulus(&request(31, true), &mut StdRng::seed_from_u64(0));
        assert!(matches!(err, Err(ConfigError::GridTooSmall { cells: 16, needed: 32 })));
    }

    #[test]
    fn target_color_must_belong_to_the_pair() {
        let design = DesignConfig::fast();
        let generator = StimulusGenerator::new(&design);
        let mut req = request(31, true);
        req.target_color = 1;
        let err = generator.create_stimulus(&req, &mut StdRng::seed_from_u64(0));
        assert!(matches!(err, Err(ConfigError::ColorNotInPair { color: 1, pair: 0 })));
    }

    #[test]
    fn frame_uses_palette_and_background() {
        let design = DesignConfig::fast();
        let generator = StimulusGenerator::new(&design);
        let s = generator
            .create_stimulus(&request(31, true), &mut StdRng::seed_from_u64(4))
            .unwrap();
        let frame = s.to_frame(&design);
        assert_eq!(frame.primitives.len(), 32);
        assert_eq!(frame.background, design.background);
        assert!(frame.primitives.iter().all(|p| p.size == 45.0));
        assert!(frame.overlay.is_none());
    }
}
