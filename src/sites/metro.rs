use crate::models::MetroStation;

/// Station → (line number, line color). The table carries the stations that
/// actually show up in Moscow listings; unknown stations fall back to gray.
const METRO_LINES: &[(&str, &str, &str)] = &[
    // Line 1 — Сокольническая
    ("Сокольники", "1", "#E42313"),
    ("Красносельская", "1", "#E42313"),
    ("Комсомольская", "1", "#E42313"),
    ("Красные Ворота", "1", "#E42313"),
    ("Чистые пруды", "1", "#E42313"),
    ("Лубянка", "1", "#E42313"),
    ("Охотный Ряд", "1", "#E42313"),
    ("Библиотека имени Ленина", "1", "#E42313"),
    ("Кропоткинская", "1", "#E42313"),
    ("Парк культуры", "1", "#E42313"),
    ("Спортивная", "1", "#E42313"),
    ("Университет", "1", "#E42313"),
    ("Юго-Западная", "1", "#E42313"),
    // Line 2 — Замоскворецкая
    ("Речной вокзал", "2", "#048339"),
    ("Войковская", "2", "#048339"),
    ("Сокол", "2", "#048339"),
    ("Аэропорт", "2", "#048339"),
    ("Динамо", "2", "#048339"),
    ("Белорусская", "2", "#048339"),
    ("Маяковская", "2", "#048339"),
    ("Тверская", "2", "#048339"),
    ("Театральная", "2", "#048339"),
    ("Новокузнецкая", "2", "#048339"),
    ("Автозаводская", "2", "#048339"),
    ("Царицыно", "2", "#048339"),
    // Line 3 — Арбатско-Покровская
    ("Щёлковская", "3", "#0252A2"),
    ("Измайловская", "3", "#0252A2"),
    ("Партизанская", "3", "#0252A2"),
    ("Бауманская", "3", "#0252A2"),
    ("Курская", "3", "#0252A2"),
    ("Площадь Революции", "3", "#0252A2"),
    ("Арбатская", "3", "#0252A2"),
    ("Смоленская", "3", "#0252A2"),
    ("Киевская", "3", "#0252A2"),
    ("Молодёжная", "3", "#0252A2"),
    ("Крылатское", "3", "#0252A2"),
    // Line 4 — Филёвская
    ("Фили", "4", "#1BB3E7"),
    ("Кутузовская", "4", "#1BB3E7"),
    ("Студенческая", "4", "#1BB3E7"),
    // Line 5 — Кольцевая
    ("Таганская", "5", "#894E35"),
    ("Павелецкая", "5", "#894E35"),
    ("Добрынинская", "5", "#894E35"),
    ("Октябрьская", "5", "#894E35"),
    ("Новослободская", "5", "#894E35"),
    ("Проспект Мира", "5", "#894E35"),
    // Line 6 — Калужско-Рижская
    ("Медведково", "6", "#F58631"),
    ("Бабушкинская", "6", "#F58631"),
    ("ВДНХ", "6", "#F58631"),
    ("Алексеевская", "6", "#F58631"),
    ("Рижская", "6", "#F58631"),
    ("Сухаревская", "6", "#F58631"),
    ("Тургеневская", "6", "#F58631"),
    ("Китай-город", "6", "#F58631"),
    ("Третьяковская", "6", "#F58631"),
    ("Шаболовская", "6", "#F58631"),
    ("Ленинский проспект", "6", "#F58631"),
    ("Академическая", "6", "#F58631"),
    ("Профсоюзная", "6", "#F58631"),
    ("Новые Черёмушки", "6", "#F58631"),
    ("Калужская", "6", "#F58631"),
    ("Беляево", "6", "#F58631"),
    ("Ясенево", "6", "#F58631"),
    // Line 7 — Таганско-Краснопресненская
    ("Планерная", "7", "#8E479C"),
    ("Сходненская", "7", "#8E479C"),
    ("Тушинская", "7", "#8E479C"),
    ("Щукинская", "7", "#8E479C"),
    ("Октябрьское Поле", "7", "#8E479C"),
    ("Полежаевская", "7", "#8E479C"),
    ("Беговая", "7", "#8E479C"),
    ("Улица 1905 года", "7", "#8E479C"),
    ("Баррикадная", "7", "#8E479C"),
    ("Пушкинская", "7", "#8E479C"),
    ("Кузнецкий Мост", "7", "#8E479C"),
    ("Кузьминки", "7", "#8E479C"),
    ("Выхино", "7", "#8E479C"),
    // Line 8 — Калининская
    ("Новогиреево", "8", "#FFCB31"),
    ("Перово", "8", "#FFCB31"),
    ("Шоссе Энтузиастов", "8", "#FFCB31"),
    ("Авиамоторная", "8", "#FFCB31"),
    ("Площадь Ильича", "8", "#FFCB31"),
    ("Марксистская", "8", "#FFCB31"),
    // Line 9 — Серпуховско-Тимирязевская
    ("Алтуфьево", "9", "#A1A2A3"),
    ("Бибирево", "9", "#A1A2A3"),
    ("Отрадное", "9", "#A1A2A3"),
    ("Тимирязевская", "9", "#A1A2A3"),
    ("Дмитровская", "9", "#A1A2A3"),
    ("Савёловская", "9", "#A1A2A3"),
    ("Менделеевская", "9", "#A1A2A3"),
    ("Цветной бульвар", "9", "#A1A2A3"),
    ("Чеховская", "9", "#A1A2A3"),
    ("Боровицкая", "9", "#A1A2A3"),
    ("Полянка", "9", "#A1A2A3"),
    ("Серпуховская", "9", "#A1A2A3"),
    ("Тульская", "9", "#A1A2A3"),
    ("Нагатинская", "9", "#A1A2A3"),
    ("Пражская", "9", "#A1A2A3"),
    // Line 10 — Люблинско-Дмитровская
    ("Марьина Роща", "10", "#B3D445"),
    ("Достоевская", "10", "#B3D445"),
    ("Трубная", "10", "#B3D445"),
    ("Сретенский бульвар", "10", "#B3D445"),
    ("Чкаловская", "10", "#B3D445"),
    ("Римская", "10", "#B3D445"),
    ("Крестьянская Застава", "10", "#B3D445"),
    ("Дубровка", "10", "#B3D445"),
    ("Кожуховская", "10", "#B3D445"),
    ("Печатники", "10", "#B3D445"),
    ("Волжская", "10", "#B3D445"),
    ("Люблино", "10", "#B3D445"),
    ("Братиславская", "10", "#B3D445"),
    ("Марьино", "10", "#B3D445"),
    // Line 11 — Большая кольцевая
    ("Савёловская БКЛ", "11", "#82C0C0"),
    ("Петровский парк", "11", "#82C0C0"),
    ("ЦСКА", "11", "#82C0C0"),
    ("Хорошёвская", "11", "#82C0C0"),
    ("Нижегородская", "11", "#82C0C0"),
    // Line 12 — Бутовская
    ("Бунинская аллея", "12", "#ACBFE1"),
    ("Улица Горчакова", "12", "#ACBFE1"),
    ("Бульвар Адмирала Ушакова", "12", "#ACBFE1"),
];

/// Lines whose color is light enough to need a black chip circle.
const DARK_CIRCLE_LINES: &[&str] = &["1", "2", "3", "5", "7", "8", "9", "10", "11", "12"];

pub fn circle_color_for_line(line_number: &str) -> &'static str {
    if DARK_CIRCLE_LINES.contains(&line_number) {
        "#000000"
    } else {
        "#ffffff"
    }
}

/// Looks up one station by exact name.
pub fn station_info(name: &str) -> MetroStation {
    for (station, line, color) in METRO_LINES {
        if *station == name {
            return MetroStation {
                name: name.to_string(),
                line_color: (*color).to_string(),
                line_number: (*line).to_string(),
                circle_color: circle_color_for_line(line).to_string(),
            };
        }
    }

    MetroStation {
        name: name.to_string(),
        line_color: "#666666".to_string(),
        line_number: "?".to_string(),
        circle_color: "#ffffff".to_string(),
    }
}

/// Scans free text for known station names; used when the location card only
/// yields an unstructured blob.
pub fn find_stations_in_text(text: &str) -> Vec<MetroStation> {
    let mut found = Vec::new();
    for (station, _, _) in METRO_LINES {
        if text.contains(station) && !found.iter().any(|s: &MetroStation| s.name == *station) {
            found.push(station_info(station));
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_station() {
        let station = station_info("Таганская");
        assert_eq!(station.line_number, "5");
        assert_eq!(station.line_color, "#894E35");
        assert_eq!(station.circle_color, "#000000");
    }

    #[test]
    fn test_unknown_station_fallback() {
        let station = station_info("Нигденевская");
        assert_eq!(station.line_number, "?");
        assert_eq!(station.line_color, "#666666");
        assert_eq!(station.circle_color, "#ffffff");
    }

    #[test]
    fn test_circle_color_rule() {
        assert_eq!(circle_color_for_line("1"), "#000000");
        assert_eq!(circle_color_for_line("6"), "#ffffff");
        assert_eq!(circle_color_for_line("4"), "#ffffff");
    }

    #[test]
    fn test_find_stations_in_text() {
        let stations =
            find_stations_in_text("5 мин пешком от метро Таганская, рядом Марксистская");
        let names: Vec<_> = stations.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Таганская", "Марксистская"]);
    }

    #[test]
    fn test_find_stations_no_duplicates() {
        let stations = find_stations_in_text("Таганская и ещё раз Таганская");
        assert_eq!(stations.len(), 1);
    }
}
