use chrono::{DateTime, Local};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};
use trafficount_common::{Region, TrackedDetection};

use crate::counting::track_history::TrackHistory;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const TRAIL_COLOR: Rgb<u8> = Rgb([230, 230, 230]);
const REGION_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const PANEL_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const TEXT_COLOR: Rgb<u8> = Rgb([17, 31, 104]);

const PANEL_MARGIN: i32 = 10;
const TEXT_HEIGHT: f32 = 18.0;
const LINE_HEIGHT: i32 = 22;

/// Draws boxes, centroid trails and the counting line onto `image`.
pub fn annotate(
    image: &mut RgbImage,
    detections: &[TrackedDetection],
    history: &TrackHistory,
    region: &Region,
) {
    for detection in detections {
        let bbox = &detection.bbox;
        let rect = Rect::at(bbox.xmin as i32, bbox.ymin as i32).of_size(
            (bbox.width().max(1.0)) as u32,
            (bbox.height().max(1.0)) as u32,
        );
        draw_hollow_rect_mut(image, rect, BOX_COLOR);

        let Some(track) = history.peek(detection.track_id) else {
            continue;
        };
        let points: Vec<_> = track.trajectory().collect();
        for pair in points.windows(2) {
            draw_line_segment_mut(
                image,
                (pair[0].x as f32, pair[0].y as f32),
                (pair[1].x as f32, pair[1].y as f32),
                TRAIL_COLOR,
            );
        }
    }

    draw_line_segment_mut(
        image,
        (region.p1.x as f32, region.p1.y as f32),
        (region.p2.x as f32, region.p2.y as f32),
        REGION_COLOR,
    );
}

pub fn totals_lines(time: DateTime<Local>, total_in: u64, total_out: u64) -> [String; 3] {
    [
        format!("TIME: {}", time.format("%Y-%m-%d %H:%M:%S")),
        format!("IN: {}", total_in),
        format!("OUT: {}", total_out),
    ]
}

/// Draws `lines` on a white panel in the top-left corner. Without a font only
/// the panel is drawn.
pub fn draw_totals(image: &mut RgbImage, lines: &[String], font: Option<&Font<'_>>) {
    if lines.is_empty() {
        return;
    }
    let scale = Scale::uniform(TEXT_HEIGHT);
    let text_width = lines
        .iter()
        .map(|line| match font {
            Some(font) => text_size(scale, font, line).0,
            None => line.chars().count() as i32 * (TEXT_HEIGHT as i32 / 2),
        })
        .max()
        .unwrap_or(0);

    let width = (text_width + 2 * PANEL_MARGIN).max(1) as u32;
    let height = (lines.len() as i32 * LINE_HEIGHT + PANEL_MARGIN).max(1) as u32;
    draw_filled_rect_mut(image, Rect::at(PANEL_MARGIN, PANEL_MARGIN).of_size(width, height), PANEL_COLOR);

    let Some(font) = font else {
        return;
    };
    for (row, line) in lines.iter().enumerate() {
        let y = 2 * PANEL_MARGIN + row as i32 * LINE_HEIGHT;
        draw_text_mut(image, TEXT_COLOR, 2 * PANEL_MARGIN, y, scale, font, line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use trafficount_common::{BBox, Point};

    const SYSTEM_FONT: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";

    fn lines() -> [String; 3] {
        totals_lines(Local.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(), 12, 7)
    }

    #[test]
    fn totals_lines_show_time_and_counts() {
        assert_eq!(lines(), ["TIME: 2026-01-02 03:04:05", "IN: 12", "OUT: 7"]);
    }

    #[test]
    fn totals_panel_is_drawn_without_a_font() {
        let mut image = RgbImage::new(320, 120);

        draw_totals(&mut image, &lines(), None);

        assert_eq!(*image.get_pixel(PANEL_MARGIN as u32, PANEL_MARGIN as u32), PANEL_COLOR);
        assert_eq!(*image.get_pixel(0, 0), Rgb([0, 0, 0]));
        assert_eq!(*image.get_pixel(319, 119), Rgb([0, 0, 0]));
    }

    #[test]
    fn totals_text_is_written_on_the_panel() {
        let Some(font) = std::fs::read(SYSTEM_FONT).ok().and_then(Font::try_from_vec) else {
            return;
        };
        let mut image = RgbImage::new(320, 120);

        draw_totals(&mut image, &lines(), Some(&font));

        let inked = image
            .enumerate_pixels()
            .filter(|(x, y, _)| *x >= 2 * PANEL_MARGIN as u32 && *y >= 2 * PANEL_MARGIN as u32)
            .any(|(_, _, pixel)| *pixel != PANEL_COLOR && *pixel != Rgb([0, 0, 0]));
        assert!(inked);
    }

    #[test]
    fn draws_boxes_and_region() {
        let mut image = RgbImage::new(64, 64);
        let mut history = TrackHistory::new(10, 10);
        let track = history.get_or_create(1);
        track.push(Point::new(10, 20));
        track.push(Point::new(20, 20));
        let detections = vec![TrackedDetection {
            track_id: 1,
            bbox: BBox::new(5.0, 5.0, 25.0, 35.0),
            confidence: 0.9,
        }];
        let region = Region {
            p1: Point::new(40, 0),
            p2: Point::new(40, 63),
        };

        annotate(&mut image, &detections, &history, &region);

        assert_eq!(*image.get_pixel(5, 5), BOX_COLOR);
        assert_eq!(*image.get_pixel(15, 20), TRAIL_COLOR);
        assert_eq!(*image.get_pixel(40, 30), REGION_COLOR);
    }

    #[test]
    fn degenerate_boxes_do_not_panic() {
        let mut image = RgbImage::new(8, 8);
        let detections = vec![TrackedDetection {
            track_id: 2,
            bbox: BBox::new(3.0, 3.0, 3.0, 3.0),
            confidence: 0.5,
        }];

        annotate(&mut image, &detections, &TrackHistory::default(), &Region::default());
    }
}
