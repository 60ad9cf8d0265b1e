//! FFmpeg video filter definitions.
//!
//! Blur-pad fallbacks for square/vertical formats, the sendcmd crop filter
//! used to build the shared cropped source videos, and the end-slate
//! letterbox/concat filter.

/// Square blur-pad fallback: blurred center-crop background with the
/// original letterboxed on top. Used when no crop-command file exists for
/// the batch.
pub const SQUARE_BLUR_FILTER: &str = concat!(
    "split=2[bg][fg];",
    "[bg]crop=ih:ih,scale=1080:1080,gblur=sigma=20[bg];",
    "[fg]scale=1080:-2[fg];",
    "[bg][fg]overlay=(W-w)/2:(H-h)/2"
);

/// Vertical blur-pad fallback, same construction at 9:16.
pub const VERTICAL_BLUR_FILTER: &str = concat!(
    "split=2[bg][fg];",
    "[bg]crop=ih*9/16:ih,scale=1080:1920,gblur=sigma=20[bg];",
    "[fg]scale=1080:-2[fg];",
    "[bg][fg]overlay=(W-w)/2:(H-h)/2"
);

/// Filter that replays a crop-command file over the source and crops to
/// the final dimensions parsed from that file.
pub fn crop_command_filter(crop_file_path: &str, width: &str, height: &str) -> String {
    format!("[0:v]sendcmd=f={crop_file_path},crop[cropped];[cropped]crop={width}:{height}")
}

/// Parse the crop dimensions off the first line of a crop-command file.
///
/// The line ends with `crop w <w>, crop h <h>;`.
pub fn parse_crop_dimensions(first_line: &str) -> Option<(String, String)> {
    let rest = first_line.split("crop w ").nth(1)?;
    let (width, rest) = rest.split_once(", crop h ")?;
    let height = rest.split(';').next()?;
    if width.is_empty() || height.is_empty() {
        return None;
    }
    Some((width.trim().to_string(), height.trim().to_string()))
}

/// Filter that letterboxes a slate image to the video's own resolution and
/// concatenates it after the video.
///
/// The pixel aspect ratio is forced to 1:1 on both branches; concat
/// refuses streams with mismatched SARs.
pub fn end_slate_filter(video_width: u32, video_height: u32) -> String {
    format!(
        "[1:v]scale={w}:{h}:force_original_aspect_ratio=decrease,\
         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black,setsar=1:1[img];\
         [0:v]setsar=1:1[v];\
         [v][img]concat=n=2:v=1:a=0[outv]",
        w = video_width,
        h = video_height
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_command_filter() {
        let filter = crop_command_filter("/tmp/square.txt", "1080", "1080");
        assert_eq!(
            filter,
            "[0:v]sendcmd=f=/tmp/square.txt,crop[cropped];[cropped]crop=1080:1080"
        );
    }

    #[test]
    fn test_parse_crop_dimensions() {
        let line = "0.0-1.5 [enter] crop x 420, crop y 0, crop w 1080, crop h 1080;";
        assert_eq!(
            parse_crop_dimensions(line),
            Some(("1080".to_string(), "1080".to_string()))
        );
        assert_eq!(parse_crop_dimensions("no crop here"), None);
    }

    #[test]
    fn test_end_slate_filter_uses_video_resolution() {
        let filter = end_slate_filter(1920, 1080);
        assert!(filter.contains("scale=1920:1080:force_original_aspect_ratio=decrease"));
        assert!(filter.contains("pad=1920:1080:(ow-iw)/2:(oh-ih)/2:color=black"));
        assert!(filter.contains("setsar=1:1[img]"));
        assert!(filter.ends_with("[v][img]concat=n=2:v=1:a=0[outv]"));
    }

    #[test]
    fn test_blur_filters_are_single_input() {
        assert!(!SQUARE_BLUR_FILTER.contains("[1:v]"));
        assert!(!VERTICAL_BLUR_FILTER.contains("[1:v]"));
    }
}
