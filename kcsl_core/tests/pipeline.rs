use chrono::NaiveDate;
use kcsl_core::{
    assembler::{Assembler, Layout},
    business_days::business_days,
    calendar::{GroupCalendar, MenuMonth},
    grid::Grid,
    holidays::HolidaySet,
    lexicon::Lexicon,
    pipeline::ensure_day_count,
    tokenizer::CellTokenizer,
};

/// February 2019 has 19 school days, 11th is National Foundation Day.
fn february_grid() -> Grid {
    let mut header = vec![String::new(); 20];
    header[0] = String::from("日付\nこんだて");
    let mut dishes = vec![];
    let mut sides = vec![];
    let mut salads = vec![];
    for day in 1..=19 {
        dishes.push(format!("ご\nは\nん\nさばのみそに{day}"));
        sides.push(String::from("ぎゅうにゅう"));
        salads.push(String::from("だいこんのにもの\nほうれん草のごまあえ"));
    }
    dishes.push(String::from("エネルギー"));
    sides.push(String::from("お知らせです。"));
    salads.push(String::new());
    Grid::new(vec![
        header,
        dishes,
        sides,
        salads,
        vec![String::from("おかず")],
        vec![String::from("冷凍食品を使用しています"), String::from("A")],
    ])
}

#[test]
fn test_grid_to_calendar_twice() {
    let lexicon = Lexicon::builtin().unwrap();
    let holidays = HolidaySet::supplementary();
    let menu_month = MenuMonth::new(2019, 2, "kita");
    let assembler = Assembler::new(CellTokenizer::new(&lexicon), 2019, 2);

    let menus = assembler
        .assemble(Layout::Blocks, &february_grid(), "2-kita.pdf")
        .unwrap();
    let days = business_days(2019, 2, &holidays);
    ensure_day_count("2019-02-kita", days.len(), menus.len()).unwrap();
    assert_eq!(
        menus[0],
        vec![
            "ごはん",
            "さばのみそに1",
            "ぎゅうにゅう",
            "だいこんのにもの",
            "ほうれん草のごまあえ"
        ]
    );
    assert_eq!(days[0], NaiveDate::from_ymd_opt(2019, 2, 1).unwrap());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kita.ics");
    let stamp = NaiveDate::from_ymd_opt(2019, 1, 25)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();

    let mut calendar = GroupCalendar::load(&path, "kita").unwrap();
    let stats = calendar.merge(&menu_month, &days, &menus, stamp);
    assert_eq!(stats.created, 19);
    calendar.write(&path).unwrap();
    let first = std::fs::read(&path).unwrap();
    let text = String::from_utf8(first.clone()).unwrap();
    assert!(text.split("\r\n").all(|line| line.len() <= 75));
    assert!(text.contains("\r\n "));

    let menus_again = assembler
        .assemble(Layout::Blocks, &february_grid(), "2-kita.pdf")
        .unwrap();
    assert_eq!(menus, menus_again);
    let mut calendar = GroupCalendar::load(&path, "kita").unwrap();
    let stats = calendar.merge(&menu_month, &days, &menus_again, stamp);
    assert_eq!(stats.unchanged, 19);
    calendar.write(&path).unwrap();
    assert_eq!(first, std::fs::read(&path).unwrap());
}
