use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Left-aligned columns separated by two spaces, with a dashed rule under
/// the header. Cells past the last header are printed unpadded.
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    print_row(&widths, headers.iter().copied());
    let rule: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", rule.join("  "));
    for row in rows {
        print_row(&widths, row.iter().map(String::as_str));
    }
}

fn print_row<'a>(widths: &[usize], cells: impl Iterator<Item = &'a str>) {
    let padded: Vec<String> = cells
        .enumerate()
        .map(|(i, cell)| match widths.get(i) {
            Some(&w) => format!("{cell:w$}"),
            None => cell.to_string(),
        })
        .collect();
    println!("{}", padded.join("  ").trim_end());
}

/// First block of an upper-case UUID, enough to tell steps apart on screen.
pub fn short_id(id: &str) -> String {
    id.split('-').next().unwrap_or(id).to_string()
}
