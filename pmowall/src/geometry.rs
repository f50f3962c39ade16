//! Projection of a video frame onto the wall.
//!
//! Given the pixel size of the rendered video image and the [`WallLayout`],
//! [`project`] computes, for every screen, the pixel rectangle it covers and
//! the background parameters that reproduce what the screen shows in TILE
//! and REPEAT mode. The same fit function drives the crop boxes sent to the
//! receivers ([`tile_crop`], [`repeat_crop`]), so preview and hardware
//! index into the same coordinate space.

use std::fmt;

use tracing::{debug, warn};

use crate::errors::{Result, WallError};
use crate::layout::{ScreenConfig, ScreenRect, WallLayout};
use crate::model::{DisplayMode, TvId};

/// Sub-rectangle size of the video that maps onto a screen of the given
/// aspect ratio, letterboxing the video into that ratio.
///
/// Receivers run the exact same arithmetic; keep the operation order.
pub fn displayable_video_dimensions(
    video_width: f64,
    video_height: f64,
    screen_width: f64,
    screen_height: f64,
) -> (f64, f64) {
    let video_aspect_ratio = video_width / video_height;
    let screen_aspect_ratio = screen_width / screen_height;

    if screen_aspect_ratio >= video_aspect_ratio {
        (video_width, video_width / screen_aspect_ratio)
    } else {
        (screen_aspect_ratio * video_height, video_height)
    }
}

/// Background-size / background-position pair, in pixels.
///
/// The image is drawn at `width`x`height` and shifted left/up by
/// `offset_x`/`offset_y`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackgroundParams {
    pub width: f64,
    pub height: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl BackgroundParams {
    pub fn css_size(&self) -> String {
        format!("{}px {}px", self.width, self.height)
    }

    pub fn css_position(&self) -> String {
        format!("-{}px -{}px", self.offset_x, self.offset_y)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScaledScreen {
    pub tv_id: TvId,
    /// Pixel rectangle within the video image.
    pub rect: ScreenRect,
    /// Window onto the single projected frame.
    pub tile: BackgroundParams,
    /// Whole frame scaled to cover this screen, centered.
    pub repeat: BackgroundParams,
}

impl ScaledScreen {
    /// Background to draw for `mode`; `None` for modes without a preview.
    pub fn background(&self, mode: &DisplayMode) -> Option<&BackgroundParams> {
        match mode {
            DisplayMode::Tile => Some(&self.tile),
            DisplayMode::Repeat => Some(&self.repeat),
            DisplayMode::Other(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScaledWallLayout {
    pub video_width: f64,
    pub video_height: f64,
    pub displayable_width: f64,
    pub displayable_height: f64,
    pub x_offset: f64,
    pub y_offset: f64,
    pub screens: Vec<ScaledScreen>,
}

impl ScaledWallLayout {
    pub fn screen(&self, tv_id: &TvId) -> Option<&ScaledScreen> {
        self.screens.iter().find(|screen| &screen.tv_id == tv_id)
    }
}

fn check_image_size(width: f64, height: f64) -> Result<()> {
    if width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0 {
        Ok(())
    } else {
        Err(WallError::InvalidImageSize { width, height })
    }
}

/// Projects a `video_width`x`video_height` image onto `layout`.
///
/// Pure and deterministic. Non-positive or non-finite image sizes are
/// rejected with [`WallError::InvalidImageSize`].
pub fn project(video_width: f64, video_height: f64, layout: &WallLayout) -> Result<ScaledWallLayout> {
    check_image_size(video_width, video_height)?;

    let wall_width = layout.width();
    let wall_height = layout.height();
    let (displayable_width, displayable_height) =
        displayable_video_dimensions(video_width, video_height, wall_width, wall_height);
    let x_offset = (video_width - displayable_width) / 2.0;
    let y_offset = (video_height - displayable_height) / 2.0;

    let screens = layout
        .screens()
        .iter()
        .map(|screen| {
            let physical = screen.rect;
            let rect = ScreenRect {
                x: x_offset + (physical.x / wall_width) * displayable_width,
                y: y_offset + (physical.y / wall_height) * displayable_height,
                width: (physical.width / wall_width) * displayable_width,
                height: (physical.height / wall_height) * displayable_height,
            };

            let tile = BackgroundParams {
                width: video_width,
                height: video_height,
                offset_x: rect.x,
                offset_y: rect.y,
            };

            ScaledScreen {
                tv_id: screen.tv_id.clone(),
                rect,
                tile,
                repeat: repeat_background(video_width, video_height, &physical, rect.width),
            }
        })
        .collect();

    Ok(ScaledWallLayout {
        video_width,
        video_height,
        displayable_width,
        displayable_height,
        x_offset,
        y_offset,
        screens,
    })
}

// Fit the frame to the screen's own aspect ratio, then scale the whole
// frame so the fitted part spans the screen's pixel width.
fn repeat_background(
    video_width: f64,
    video_height: f64,
    physical: &ScreenRect,
    pixel_width: f64,
) -> BackgroundParams {
    let (displayable_width, displayable_height) =
        displayable_video_dimensions(video_width, video_height, physical.width, physical.height);
    let x_offset = (video_width - displayable_width) / 2.0;
    let y_offset = (video_height - displayable_height) / 2.0;
    let scale = pixel_width / displayable_width;

    BackgroundParams {
        width: video_width * scale,
        height: video_height * scale,
        offset_x: x_offset * scale,
        offset_y: y_offset * scale,
    }
}

/// Integer crop box `x0 y0 x1 y1` in video pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelCrop {
    pub x0: i64,
    pub y0: i64,
    pub x1: i64,
    pub y1: i64,
}

impl fmt::Display for PixelCrop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.x0, self.y0, self.x1, self.y1)
    }
}

/// Fractional crop box `x0 y0 x1 y1` in video pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CropBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl fmt::Display for CropBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.x0, self.y0, self.x1, self.y1)
    }
}

/// Crop box a receiver applies to show `screen` in TILE mode.
///
/// Coordinates are rounded half-to-even, matching the receivers.
pub fn tile_crop(
    video_width: f64,
    video_height: f64,
    layout: &WallLayout,
    screen: &ScreenConfig,
) -> Result<PixelCrop> {
    check_image_size(video_width, video_height)?;

    let wall_width = layout.width();
    let wall_height = layout.height();
    let (displayable_width, displayable_height) =
        displayable_video_dimensions(video_width, video_height, wall_width, wall_height);
    let x_offset = (video_width - displayable_width) / 2.0;
    let y_offset = (video_height - displayable_height) / 2.0;
    let rect = screen.rect;

    let crop = PixelCrop {
        x0: (x_offset + (rect.x / wall_width) * displayable_width).round_ties_even() as i64,
        y0: (y_offset + (rect.y / wall_height) * displayable_height).round_ties_even() as i64,
        x1: (x_offset + (rect.right() / wall_width) * displayable_width).round_ties_even() as i64,
        y1: (y_offset + (rect.bottom() / wall_height) * displayable_height).round_ties_even()
            as i64,
    };

    for (name, value, limit) in [
        ("x0", crop.x0, video_width),
        ("x1", crop.x1, video_width),
        ("y0", crop.y0, video_height),
        ("y1", crop.y1, video_height),
    ] {
        if value as f64 > limit {
            warn!(
                tv_id = %screen.tv_id,
                "Crop {} coordinate ({}) exceeds the video size ({}), the wall may be misconfigured",
                name, value, limit
            );
        }
    }

    Ok(crop)
}

/// Crop box a receiver applies to show the whole frame in REPEAT mode.
pub fn repeat_crop(video_width: f64, video_height: f64, screen: &ScreenConfig) -> Result<CropBox> {
    check_image_size(video_width, video_height)?;

    let (displayable_width, displayable_height) = displayable_video_dimensions(
        video_width,
        video_height,
        screen.rect.width,
        screen.rect.height,
    );
    let x_offset = (video_width - displayable_width) / 2.0;
    let y_offset = (video_height - displayable_height) / 2.0;

    Ok(CropBox {
        x0: x_offset,
        y0: y_offset,
        x1: x_offset + displayable_width,
        y1: y_offset + displayable_height,
    })
}

/// Keeps the scaled layout in sync with the rendered image size.
///
/// A resize reporting an unusable size leaves the previous projection in
/// place.
#[derive(Clone, Debug)]
pub struct WallProjector {
    layout: WallLayout,
    current: Option<ScaledWallLayout>,
}

impl WallProjector {
    pub fn new(layout: WallLayout) -> Self {
        Self {
            layout,
            current: None,
        }
    }

    pub fn layout(&self) -> &WallLayout {
        &self.layout
    }

    /// Last successful projection, if any.
    pub fn current(&self) -> Option<&ScaledWallLayout> {
        self.current.as_ref()
    }

    pub fn on_image_resized(&mut self, width: f64, height: f64) -> Result<&ScaledWallLayout> {
        match project(width, height, &self.layout) {
            Ok(scaled) => {
                debug!("Wall layout projected onto a {}x{} image", width, height);
                let scaled = self.current.insert(scaled);
                Ok(&*scaled)
            }
            Err(err) => {
                debug!("Keeping previous wall projection: {}", err);
                Err(err)
            }
        }
    }
}
