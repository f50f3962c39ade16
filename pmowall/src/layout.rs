//! Static wall layout: wall size and screen rectangles in physical units.

use std::collections::HashSet;

use pmoconfig::WallSection;
use tracing::warn;

use crate::errors::{Result, WallError};
use crate::model::TvId;

/// Axis-aligned rectangle, in physical units or pixels depending on context.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ScreenRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width / self.height
    }

    fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScreenConfig {
    pub tv_id: TvId,
    pub rect: ScreenRect,
    pub hostname: Option<String>,
}

impl ScreenConfig {
    pub fn new(tv_id: impl Into<TvId>, rect: ScreenRect) -> Self {
        Self {
            tv_id: tv_id.into(),
            rect,
            hostname: None,
        }
    }
}

/// Validated, immutable wall description.
#[derive(Clone, Debug, PartialEq)]
pub struct WallLayout {
    width: f64,
    height: f64,
    rows: usize,
    columns: usize,
    screens: Vec<ScreenConfig>,
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

impl WallLayout {
    pub fn new(width: f64, height: f64, screens: Vec<ScreenConfig>) -> Result<Self> {
        Self::with_grid(width, height, 1, 1, screens)
    }

    /// Layout whose wall size is the bounding box of its screens.
    pub fn from_screens(screens: Vec<ScreenConfig>) -> Result<Self> {
        let (width, height) = bounding_size(&screens);
        Self::new(width, height, screens)
    }

    pub fn with_grid(
        width: f64,
        height: f64,
        rows: usize,
        columns: usize,
        screens: Vec<ScreenConfig>,
    ) -> Result<Self> {
        if !positive(width) || !positive(height) {
            return Err(WallError::invalid_layout(format!(
                "wall size must be positive, got {}x{}",
                width, height
            )));
        }
        if rows == 0 || columns == 0 {
            return Err(WallError::invalid_layout("rows and columns must be at least 1"));
        }
        if screens.is_empty() {
            return Err(WallError::invalid_layout("no screens configured"));
        }

        let mut seen = HashSet::new();
        for screen in &screens {
            if !seen.insert(&screen.tv_id) {
                return Err(WallError::invalid_layout(format!(
                    "duplicate screen id {}",
                    screen.tv_id
                )));
            }
            let rect = screen.rect;
            if !positive(rect.width) || !positive(rect.height) {
                return Err(WallError::invalid_layout(format!(
                    "screen {} has non-positive size {}x{}",
                    screen.tv_id, rect.width, rect.height
                )));
            }
            if !rect.x.is_finite() || !rect.y.is_finite() || rect.x < 0.0 || rect.y < 0.0 {
                return Err(WallError::invalid_layout(format!(
                    "screen {} has a negative or invalid position ({}, {})",
                    screen.tv_id, rect.x, rect.y
                )));
            }
            if rect.right() > width || rect.bottom() > height {
                warn!(
                    "Screen {} extends beyond the {}x{} wall",
                    screen.tv_id, width, height
                );
            }
        }

        Ok(Self {
            width,
            height,
            rows,
            columns,
            screens,
        })
    }

    /// Builds the layout from the configuration `wall` section.
    pub fn from_section(section: &WallSection) -> Result<Self> {
        let screens: Vec<ScreenConfig> = section
            .tvs
            .iter()
            .map(|tv| ScreenConfig {
                tv_id: TvId(tv.tv_id.clone()),
                rect: ScreenRect::new(tv.x, tv.y, tv.width, tv.height),
                hostname: tv.hostname.clone(),
            })
            .collect();

        let (derived_width, derived_height) = bounding_size(&screens);
        Self::with_grid(
            section.width.unwrap_or(derived_width),
            section.height.unwrap_or(derived_height),
            section.rows,
            section.columns,
            screens,
        )
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width / self.height
    }

    pub fn screens(&self) -> &[ScreenConfig] {
        &self.screens
    }

    pub fn screen(&self, tv_id: &TvId) -> Option<&ScreenConfig> {
        self.screens.iter().find(|screen| &screen.tv_id == tv_id)
    }

    pub fn tv_ids(&self) -> impl Iterator<Item = &TvId> {
        self.screens.iter().map(|screen| &screen.tv_id)
    }

    /// Screen ids grouped by grid row, using each screen's center.
    pub fn rows(&self) -> Vec<Vec<TvId>> {
        self.group_by_center(self.rows, self.height / self.rows as f64, |(_, y)| y)
    }

    /// Screen ids grouped by grid column, using each screen's center.
    pub fn columns(&self) -> Vec<Vec<TvId>> {
        self.group_by_center(self.columns, self.width / self.columns as f64, |(x, _)| x)
    }

    fn group_by_center(
        &self,
        count: usize,
        cell: f64,
        axis: impl Fn((f64, f64)) -> f64,
    ) -> Vec<Vec<TvId>> {
        let mut groups = vec![Vec::new(); count];
        for screen in &self.screens {
            let index = (axis(screen.rect.center()) / cell).floor() as usize;
            groups[index.min(count - 1)].push(screen.tv_id.clone());
        }
        groups
    }
}

fn bounding_size(screens: &[ScreenConfig]) -> (f64, f64) {
    screens.iter().fold((0.0_f64, 0.0_f64), |(w, h), screen| {
        (w.max(screen.rect.right()), h.max(screen.rect.bottom()))
    })
}
