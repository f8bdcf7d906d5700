use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Left-aligned columns two spaces apart, with a dashed rule under the
/// header. Cells past the last header are printed but not measured.
pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    println!("{}", render_row(headers, &widths));
    println!("{}", render_row(&rule, &widths));
    for row in &rows {
        println!("{}", render_row(row, &widths));
    }
}

fn render_row<S: AsRef<str>>(cells: &[S], widths: &[usize]) -> String {
    let mut line = String::new();
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            line.push_str("  ");
        }
        let cell = cell.as_ref();
        line.push_str(cell);
        let pad = widths.get(i).copied().unwrap_or(0).saturating_sub(cell.chars().count());
        line.extend(std::iter::repeat(' ').take(pad));
    }
    line.truncate(line.trim_end().len());
    line
}

/// One item per line.
pub fn print_lines<S: AsRef<str>>(items: &[S]) {
    for item in items {
        println!("{}", item.as_ref());
    }
}
