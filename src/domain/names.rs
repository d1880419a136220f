//! Furby name table
//!
//! The firmware knows 129 names, addressed by id 0-128.

/// Names indexed by id
pub const FURBY_NAMES: [&str; 129] = [
    "Ah-Bay", "Ah-Boh", "Ah-Boo", "Ah-Dah", "Ah-Doh", "Ah-Doo", "Ah-Kah", "Ah-Koh",
    "Ah-Tah", "Ah-Toh", "Bee-Bay", "Bee-Boh", "Bee-Boo", "Bee-Dah", "Bee-Doh", "Bee-Doo",
    "Bee-Kah", "Bee-Koh", "Bee-Tah", "Bee-Toh", "Dah-Bay", "Dah-Boh", "Dah-Boo", "Dah-Dah",
    "Dah-Doh", "Dah-Doo", "Dah-Kah", "Dah-Koh", "Dah-Tah", "Dah-Toh", "Day-Bay", "Day-Boh",
    "Day-Boo", "Day-Dah", "Day-Doh", "Day-Doo", "Day-Kah", "Day-Koh", "Day-Tah", "Day-Toh",
    "Dee-Bay", "Dee-Boh", "Dee-Boo", "Dee-Dah", "Dee-Doh", "Dee-Doo", "Dee-Kah", "Dee-Koh",
    "Dee-Tah", "Dee-Toh", "Doo-Bay", "Doo-Boh", "Doo-Boo", "Doo-Dah", "Doo-Doh", "Doo-Doo",
    "Doo-Kah", "Doo-Koh", "Doo-Tah", "Doo-Toh", "Kee-Bay", "Kee-Boh", "Kee-Boo", "Kee-Dah",
    "Kee-Doh", "Kee-Doo", "Kee-Kah", "Kee-Koh", "Kee-Tah", "Kee-Toh", "Loo-Bay", "Loo-Boh",
    "Loo-Boo", "Loo-Dah", "Loo-Doh", "Loo-Doo", "Loo-Kah", "Loo-Koh", "Loo-Tah", "Loo-Toh",
    "May-Bay", "May-Boh", "May-Boo", "May-Dah", "May-Doh", "May-Doo", "May-Kah", "May-Koh",
    "May-Tah", "May-Toh", "Noo-Bay", "Noo-Boh", "Noo-Boo", "Noo-Dah", "Noo-Doh", "Noo-Doo",
    "Noo-Kah", "Noo-Koh", "Noo-Tah", "Noo-Toh", "Tay-Bay", "Tay-Boh", "Tay-Boo", "Tay-Dah",
    "Tay-Doh", "Tay-Doo", "Tay-Kah", "Tay-Koh", "Tay-Toh", "Toh-Bay", "Toh-Boh", "Toh-Boo",
    "Toh-Dah", "Toh-Doh", "Toh-Doo", "Toh-Kah", "Toh-Koh", "Toh-Tah", "Toh-Toh", "Way-Bay",
    "Way-Boh", "Way-Boo", "Way-Dah", "Way-Doh", "Way-Doo", "Way-Kah", "Way-Koh", "Way-Tah",
    "Way-Toh",
];

/// Highest valid name id
pub const MAX_NAME_ID: u8 = (FURBY_NAMES.len() - 1) as u8;

pub fn name_for_id(id: u8) -> Option<&'static str> {
    FURBY_NAMES.get(id as usize).copied()
}

/// Case-insensitive reverse lookup
pub fn id_for_name(name: &str) -> Option<u8> {
    let name = name.trim();
    FURBY_NAMES
        .iter()
        .position(|candidate| candidate.eq_ignore_ascii_case(name))
        .map(|index| index as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_bounds() {
        assert_eq!(name_for_id(0), Some("Ah-Bay"));
        assert_eq!(name_for_id(108), Some("Tay-Toh"));
        assert_eq!(name_for_id(MAX_NAME_ID), Some("Way-Toh"));
        assert_eq!(name_for_id(129), None);
    }

    #[test]
    fn test_reverse_lookup() {
        assert_eq!(id_for_name("doo-dah"), Some(53));
        assert_eq!(id_for_name(" Way-Toh "), Some(128));
        assert_eq!(id_for_name("Nobody"), None);
    }
}
