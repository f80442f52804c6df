use crate::class_mapping::UNKNOWN_LABEL;

/// Estimated remaining shelf life per ripeness label.
pub const SHELF_LIFE_TABLE: [(&str, &str); 6] = [
    ("freshunripe", "8-10 days"),
    ("unripe", "6-7 days"),
    ("freshripe", "4-6 days"),
    ("ripe", "2-4 days"),
    ("overripe", "1-2 days"),
    ("rotten", "0 days"),
];

/// Shelf-life string for `label`, or `"Unknown"` for labels outside the table.
pub fn shelf_life_for(label: &str) -> &'static str {
    SHELF_LIFE_TABLE
        .iter()
        .find(|(known, _)| *known == label)
        .map_or(UNKNOWN_LABEL, |(_, shelf_life)| *shelf_life)
}

/// Lower bound, in days, of the shelf-life estimate for `label`.
///
/// Shipment alerting keys off the first number of the estimate ("2-4 days" gives 2).
pub fn min_days_remaining(label: &str) -> Option<u32> {
    let shelf_life = shelf_life_for(label);
    let digits: String = shelf_life
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}
