/// Format a float as a dollar amount with thousands separators: $1,234.56
pub fn money(val: f64) -> String {
    let cents = (val.abs() * 100.0).round() as i64;
    let mut dollars = (cents / 100).to_string();
    let mut insert_at = dollars.len() as i64 - 3;
    while insert_at > 0 {
        dollars.insert(insert_at as usize, ',');
        insert_at -= 3;
    }
    let sign = if val < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}${dollars}.{:02}", cents % 100)
}

/// Render a [0,1] confidence as a whole percentage.
pub fn percent(confidence: f64) -> String {
    format!("{:.0}%", confidence * 100.0)
}
