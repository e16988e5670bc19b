use rust_decimal::{Decimal, RoundingStrategy};

/// Compact token count: "2.3B", "1.5M", "12.0K", or a grouped integer below 1K.
pub fn format_token_count(count: u64) -> String {
    if count >= 1_000_000_000 {
        format!("{:.1}B", count as f64 / 1_000_000_000.0)
    } else if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.1}K", count as f64 / 1_000.0)
    } else {
        format_grouped(count)
    }
}

/// Integer with thousands separators, e.g. "12,345".
pub fn format_grouped(count: u64) -> String {
    let digits = count.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Dollar amount rounded to cents. Rounding only happens here.
pub fn format_cost(cost: Decimal) -> String {
    let rounded = cost.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("${:.2}", rounded)
}
