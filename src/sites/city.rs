/// Known city slugs used in Avito search paths. Anything missing falls back
/// to transliteration.
const CITY_SLUGS: &[(&str, &str)] = &[
    ("москва", "moskva"),
    ("санкт-петербург", "sankt-peterburg"),
    ("новосибирск", "novosibirsk"),
    ("екатеринбург", "ekaterinburg"),
    ("казань", "kazan"),
    ("нижний новгород", "nizhniy_novgorod"),
    ("челябинск", "chelyabinsk"),
    ("самара", "samara"),
    ("омск", "omsk"),
    ("ростов-на-дону", "rostov-na-donu"),
    ("уфа", "ufa"),
    ("красноярск", "krasnoyarsk"),
    ("пермь", "perm"),
    ("воронеж", "voronezh"),
    ("волгоград", "volgograd"),
    ("пенза", "penza"),
    ("сочи", "sochi"),
];

/// Returns the URL path segment for a city name: lookup table first, then
/// Cyrillic → Latin transliteration.
pub fn city_slug(city: &str) -> String {
    let city_lower = city.trim().to_lowercase();
    if city_lower.is_empty() {
        return "moskva".to_string();
    }

    for (name, slug) in CITY_SLUGS {
        if *name == city_lower {
            return (*slug).to_string();
        }
    }

    let slug = transliterate(&city_lower);
    collapse_dashes(&slug)
}

pub fn transliterate(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            'а' => out.push('a'),
            'б' => out.push('b'),
            'в' => out.push('v'),
            'г' => out.push('g'),
            'д' => out.push('d'),
            'е' | 'ё' | 'э' => out.push('e'),
            'ж' => out.push_str("zh"),
            'з' => out.push('z'),
            'и' => out.push('i'),
            'й' => out.push('y'),
            'к' => out.push('k'),
            'л' => out.push('l'),
            'м' => out.push('m'),
            'н' => out.push('n'),
            'о' => out.push('o'),
            'п' => out.push('p'),
            'р' => out.push('r'),
            'с' => out.push('s'),
            'т' => out.push('t'),
            'у' => out.push('u'),
            'ф' => out.push('f'),
            'х' => out.push_str("kh"),
            'ц' => out.push_str("ts"),
            'ч' => out.push_str("ch"),
            'ш' => out.push_str("sh"),
            'щ' => out.push_str("shch"),
            'ъ' | 'ь' => {}
            'ы' => out.push('y'),
            'ю' => out.push_str("yu"),
            'я' => out.push_str("ya"),
            ' ' | '-' => out.push('-'),
            other => out.push(other),
        }
    }
    out
}

fn collapse_dashes(slug: &str) -> String {
    let mut out = String::with_capacity(slug.len());
    let mut prev_dash = false;
    for c in slug.chars() {
        if c == '-' {
            if !prev_dash {
                out.push(c);
            }
            prev_dash = true;
        } else {
            out.push(c);
            prev_dash = false;
        }
    }
    out.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_cities() {
        assert_eq!(city_slug("Москва"), "moskva");
        assert_eq!(city_slug("Санкт-Петербург"), "sankt-peterburg");
        assert_eq!(city_slug("  сочи "), "sochi");
    }

    #[test]
    fn test_transliteration_fallback() {
        assert_eq!(city_slug("Тюмень"), "tyumen");
        assert_eq!(city_slug("Щёлково"), "shchelkovo");
        assert_eq!(city_slug("Набережные Челны"), "naberezhnye-chelny");
    }

    #[test]
    fn test_empty_defaults_to_moscow() {
        assert_eq!(city_slug(""), "moskva");
        assert_eq!(city_slug("   "), "moskva");
    }

    #[test]
    fn test_dash_collapse() {
        assert_eq!(collapse_dashes("a--b---c"), "a-b-c");
        assert_eq!(collapse_dashes("-abc-"), "abc");
    }
}
