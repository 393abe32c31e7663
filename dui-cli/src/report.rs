use std::fmt::Write;

use dui_core::{LifecycleView, format_count, format_size};

/// Unicode partial block characters for smooth bars
const BLOCKS: [char; 9] = [' ', '▏', '▎', '▍', '▌', '▋', '▊', '▉', '█'];

const BAR_WIDTH: usize = 24;

/// Bar of `width` cells filled in proportion to `part / whole`
pub fn share_bar(part: u64, whole: u64, width: usize) -> String {
    if width == 0 {
        return String::new();
    }

    let ratio = if whole == 0 {
        0.0
    } else {
        (part as f64 / whole as f64).clamp(0.0, 1.0)
    };
    let filled_width = ratio * width as f64;
    let full_blocks = filled_width.floor() as usize;
    let partial = ((filled_width - full_blocks as f64) * 8.0).round() as usize;

    let mut bar = String::with_capacity(width * 3);
    for _ in 0..full_blocks.min(width) {
        bar.push(BLOCKS[8]);
    }
    if full_blocks < width && partial > 0 {
        bar.push(BLOCKS[partial.min(8)]);
    }
    let current_len = bar.chars().count();
    for _ in current_len..width {
        bar.push(' ');
    }
    bar
}

/// Plain-text summary of a settled lifecycle view
pub fn render(view: &LifecycleView, top: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", view.root.display());

    if let Some(volume) = &view.volume {
        let _ = writeln!(
            out,
            "  volume  [{}] {} used, {} free of {}",
            share_bar(volume.used_bytes(), volume.total_bytes, BAR_WIDTH),
            volume.usage_percent_label,
            format_size(volume.free_bytes),
            format_size(volume.total_bytes),
        );
    }

    let Some(index) = &view.index else {
        let _ = writeln!(out, "  no index available");
        return out;
    };

    let restricted: usize = index.iter().map(|(_, f)| f.restricted.len()).sum();
    let _ = writeln!(
        out,
        "  index   {} folders, {} entries, {} restricted ({})",
        format_count(index.len() as u64),
        format_count(index.entry_count() as u64),
        format_count(restricted as u64),
        if view.restored_from_cache {
            "from snapshot"
        } else {
            "fresh scan"
        },
    );

    if view.session.items_deleted > 0 {
        let _ = writeln!(
            out,
            "  freed   {} in {} item(s)",
            format_size(view.session.bytes_freed),
            view.session.items_deleted,
        );
    }

    let largest = index.largest(top);
    if largest.is_empty() {
        return out;
    }

    let biggest = largest[0].size_bytes;
    let _ = writeln!(out);
    for entry in largest {
        let _ = writeln!(
            out,
            "  {:>10}  {}  {}",
            entry.size_label,
            share_bar(entry.size_bytes, biggest, BAR_WIDTH / 2),
            entry.path.display(),
        );
    }
    out
}
