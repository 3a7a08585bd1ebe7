use std::{cmp::Ordering, collections::HashSet};

use serde::Serialize;

use crate::extractor::RawFormat;

pub const BEST_FORMAT_ID: &str = "best";
pub const BEST_VIDEO_AUDIO_FORMAT_ID: &str = "bv*+ba/b";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityOption {
    pub format_id: String,
    pub resolution: String,
    pub ext: String,
    pub filesize: u64,
    /// Mirrors `filesize`; the browser code reads either.
    pub filesize_approx: u64,
    pub format_note: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
}

impl QualityOption {
    fn synthetic(format_id: &str, note: &str) -> Self {
        Self {
            format_id: format_id.to_string(),
            resolution: "Best Quality".to_string(),
            ext: "auto".to_string(),
            filesize: 0,
            filesize_approx: 0,
            format_note: note.to_string(),
            fps: None,
        }
    }
}

/// Builds the list shown to the user: the two convenience selectors first,
/// then one entry per distinct (height, extension) pair, tallest and
/// smoothest first. Audio-only and height-less formats are dropped.
pub fn quality_options(formats: &[RawFormat]) -> Vec<QualityOption> {
    let mut seen = HashSet::new();
    let mut discovered: Vec<(u32, QualityOption)> = formats
        .iter()
        .filter(|format| !is_audio_only(format))
        .filter_map(|format| {
            let height = format.height.filter(|height| *height > 0)?;
            let ext = format.ext.clone().unwrap_or_default();
            if !seen.insert((height, ext.clone())) {
                return None;
            }

            let filesize = format
                .filesize
                .or(format.filesize_approx)
                .filter(|size| size.is_finite() && *size > 0.0)
                .map(|size| size as u64)
                .unwrap_or_default();

            Some((
                height,
                QualityOption {
                    format_id: format.format_id.clone().unwrap_or_default(),
                    resolution: format!("{height}p"),
                    ext,
                    filesize,
                    filesize_approx: filesize,
                    format_note: format.format_note.clone().unwrap_or_default(),
                    fps: format.fps,
                },
            ))
        })
        .collect();

    discovered.sort_by(|a, b| {
        b.0.cmp(&a.0).then_with(|| {
            let fps_a = a.1.fps.unwrap_or_default();
            let fps_b = b.1.fps.unwrap_or_default();
            fps_b.partial_cmp(&fps_a).unwrap_or(Ordering::Equal)
        })
    });

    let mut options = vec![
        QualityOption::synthetic(BEST_FORMAT_ID, "Recommended"),
        QualityOption::synthetic(BEST_VIDEO_AUDIO_FORMAT_ID, "Best video with best audio"),
    ];
    options.extend(discovered.into_iter().map(|(_, option)| option));
    options
}

fn is_audio_only(format: &RawFormat) -> bool {
    format.vcodec.as_deref() == Some("none") || format.resolution.as_deref() == Some("audio only")
}
