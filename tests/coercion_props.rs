use chrono::Duration;
use proptest::prelude::*;

use gridbase::value::{
    Cell, FindOptions, LogicalType, cells_equal, coerce, date_from_serial,
};

fn any_cell() -> impl Strategy<Value = Cell> {
    prop_oneof![
        Just(Cell::Blank),
        "[ -~]{0,24}".prop_map(Cell::Text),
        (-1.0e9..1.0e9f64).prop_map(Cell::Number),
        any::<bool>().prop_map(Cell::Bool),
        (-25_000i64..100_000)
            .prop_map(|serial| Cell::Date(date_from_serial(serial as f64).unwrap())),
    ]
}

proptest! {
    #[test]
    fn coercion_is_idempotent_when_it_succeeds(
        cell in any_cell(),
        ty in prop_oneof![
            Just(LogicalType::String),
            Just(LogicalType::Number),
            Just(LogicalType::Boolean),
            Just(LogicalType::Date),
            Just(LogicalType::Any),
        ],
    ) {
        if let Ok(once) = coerce(ty, &cell) {
            let twice = coerce(ty, &once).expect("re-coercion of a coerced cell");
            prop_assert_eq!(once, twice);
        }
    }

    #[test]
    fn string_coercion_never_fails(cell in any_cell()) {
        prop_assert!(coerce(LogicalType::String, &cell).is_ok());
    }

    #[test]
    fn boolean_coercion_of_text_never_fails(text in "[ -~]{0,24}") {
        prop_assert!(coerce(LogicalType::Boolean, &Cell::Text(text)).is_ok());
    }

    #[test]
    fn blank_passes_through_every_type(
        ty in prop_oneof![
            Just(LogicalType::String),
            Just(LogicalType::Number),
            Just(LogicalType::Boolean),
            Just(LogicalType::Date),
            Just(LogicalType::Any),
        ],
    ) {
        prop_assert_eq!(coerce(ty, &Cell::Blank).unwrap(), Cell::Blank);
    }

    #[test]
    fn consecutive_serials_are_one_day_apart(serial in -25_000i64..100_000) {
        let a = date_from_serial(serial as f64).unwrap();
        let b = date_from_serial((serial + 1) as f64).unwrap();
        prop_assert_eq!(b - a, Duration::days(1));
    }

    #[test]
    fn cells_equal_is_reflexive(cell in any_cell(), trim in any::<bool>(), fold in any::<bool>()) {
        let opts = FindOptions { case_insensitive: fold, trim };
        prop_assert!(cells_equal(&cell, &cell, opts));
    }

    #[test]
    fn number_coercion_round_trips_through_text(n in -1.0e9..1.0e9f64) {
        let rendered = coerce(LogicalType::String, &Cell::Number(n)).unwrap();
        let back = coerce(LogicalType::Number, &rendered).unwrap();
        match back {
            Cell::Number(m) => prop_assert!((m - n).abs() <= n.abs() * 1e-12),
            other => prop_assert!(false, "expected a number, got {:?}", other),
        }
    }
}
