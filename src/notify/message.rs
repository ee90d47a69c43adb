use std::collections::HashMap;

use crate::models::{ListingRecord, Site};

/// Hard cap imposed by the chat API on photo captions; the composer budgets
/// the description so the final body never exceeds it.
pub const MAX_MESSAGE_CHARS: usize = 1024;

const MAX_HASHTAGS: usize = 7;

/// Words that never become hashtags.
const HASHTAG_STOP_WORDS: &[&str] = &[
    "это", "как", "так", "над", "для", "что", "кто", "она", "или", "этот", "тот", "где",
    "когда", "если", "только", "очень", "можно", "при", "есть", "еще", "уже", "все", "его",
    "там", "тут", "после", "потом", "пока", "тем", "чем", "самый", "более", "менее", "новый",
    "новая", "новое", "оригинал", "оригинальный", "оригинальная", "размер", "цвет",
    "состояние", "отличное", "хорошее", "купить", "продам", "продажа", "цена", "рубль",
    "руб", "город", "адрес", "метро", "доставка", "самовывоз", "описание",
    "характеристики", "фото", "видео", "отзывы", "рейтинг", "балл", "продавец", "магазин",
    "частник", "объявление", "товар", "вещь", "модель", "бренд", "марка", "производитель",
    "страна", "год", "месяц", "неделя", "день", "час", "время", "сегодня", "вчера",
];

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Frequency-derived hashtags over title (×3), category (×2) and
/// description, excluding stop words, digits and short words.
pub fn generate_hashtags(record: &ListingRecord) -> String {
    let mut text = String::new();
    for _ in 0..3 {
        text.push(' ');
        text.push_str(&record.title.to_lowercase());
    }
    if let Some(category) = &record.category {
        for _ in 0..2 {
            text.push(' ');
            text.push_str(&category.to_lowercase());
        }
    }
    if let Some(description) = &record.description {
        text.push(' ');
        text.push_str(&description.to_lowercase());
    }

    let mut freq: HashMap<String, usize> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for raw in text.split(|c: char| !c.is_alphanumeric()) {
        let word = raw.trim();
        if word.chars().count() < 3
            || word.chars().any(|c| c.is_ascii_digit())
            || HASHTAG_STOP_WORDS.contains(&word)
        {
            continue;
        }
        let entry = freq.entry(word.to_string()).or_insert(0);
        if *entry == 0 {
            order.push(word.to_string());
        }
        *entry += 1;
    }

    let mut words: Vec<&String> = order.iter().collect();
    words.sort_by(|a, b| freq[*b].cmp(&freq[*a]));

    let tags: Vec<String> = words
        .iter()
        .take(MAX_HASHTAGS)
        .map(|w| format!("#{w}"))
        .collect();

    if tags.is_empty() {
        "#автопоиск".to_string()
    } else {
        tags.join(" ")
    }
}

/// Star bar for the seller rating line: «★★★★½ (4.5/5) (12 отзывов)».
pub fn format_rating(record: &ListingRecord) -> Option<String> {
    let rating = record.seller_rating?;
    let rounded = (rating * 10.0).round() / 10.0;
    let full = rounded.floor() as usize;
    let half = if rounded - full as f64 >= 0.5 { 1 } else { 0 };
    let empty = 5usize.saturating_sub(full + half);

    let stars = "★".repeat(full) + &"½".repeat(half) + &"☆".repeat(empty);
    let reviews = match record.reviews_count {
        Some(count) if count > 0 => format!(" ({count} отзывов)"),
        _ => " (нет отзывов)".to_string(),
    };
    Some(format!("{stars} ({rounded}/5){reviews}"))
}

/// Seller line: Avito has no structured type, so the review count decides
/// between shop and private; Auto.ru carries the classified type.
pub fn format_seller(record: &ListingRecord) -> String {
    let name = record.seller_name.as_deref().unwrap_or("Не указан");
    let kind = match record.seller_type {
        Some(t) => t.as_str().to_string(),
        None => {
            if record.reviews_count.unwrap_or(0) > 150 {
                "Магазин".to_string()
            } else {
                "Частник".to_string()
            }
        }
    };
    format!("{} ({kind})", escape_html(name))
}

fn format_metro(record: &ListingRecord) -> Option<String> {
    if record.metro_stations.is_empty() {
        return None;
    }
    let names: Vec<&str> = record
        .metro_stations
        .iter()
        .take(3)
        .map(|s| s.name.as_str())
        .collect();
    Some(names.join(", "))
}

fn format_address(record: &ListingRecord) -> Option<String> {
    let address = record.address.as_deref()?;
    let clean = address.split_whitespace().collect::<Vec<_>>().join(" ");
    if clean.is_empty() {
        return None;
    }
    if clean.chars().count() > 50 {
        let cut: String = clean.chars().take(47).collect();
        Some(format!("{cut}..."))
    } else {
        Some(clean)
    }
}

fn format_price(value: i64) -> String {
    // 1650000 → "1 650 000"
    let digits: Vec<char> = value.abs().to_string().chars().collect();
    let mut grouped = String::new();
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(*c);
    }
    if value < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

/// Word-boundary truncation that keeps the result within `max` chars
/// including the ellipsis.
pub fn truncate_description(text: &str, max: usize) -> String {
    let clean = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if clean.chars().count() <= max {
        return clean;
    }
    if max <= 3 {
        return "...".to_string();
    }

    let budget = max - 3;
    let mut out = String::new();
    for word in clean.split(' ') {
        let next_len = if out.is_empty() {
            word.chars().count()
        } else {
            out.chars().count() + 1 + word.chars().count()
        };
        if next_len > budget {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    if out.is_empty() {
        // A single overlong word still gets a hard cut
        out = clean.chars().take(budget).collect();
    }
    out.push_str("...");
    out
}

/// Composes the site-appropriate HTML body, ≤ 1024 chars.
pub fn compose(record: &ListingRecord, economy: i64, economy_percent: i64) -> String {
    match record.site {
        Site::AutoRu => compose_auto_ru(record, economy, economy_percent),
        Site::Avito => compose_avito(record, economy, economy_percent),
    }
}

fn compose_avito(record: &ListingRecord, economy: i64, economy_percent: i64) -> String {
    let (header, profit_line) = if economy > 0 {
        (
            "💰 <b>ВЫГОДНАЯ СДЕЛКА!</b>".to_string(),
            format!(
                "💵 <b>Прибыль:</b> +{} ₽ ({economy_percent}%)",
                format_price(economy)
            ),
        )
    } else {
        (
            "🔍 <b>ИНТЕРЕСНОЕ ПРЕДЛОЖЕНИЕ</b>".to_string(),
            "⚖️ <b>Цена соответствует рынку</b>".to_string(),
        )
    };

    let mut lines = Vec::new();
    lines.push(header);
    lines.push(String::new());
    lines.push(
        format!("📦 <b>Товар:</b> {}", escape_html(&record.title)),
    );
    lines.push(
        format!(
            "📍 <b>Город:</b> {}",
            escape_html(record.city.as_deref().unwrap_or("Не указан"))
        ),
    );

    if let Some(metro) = format_metro(record) {
        lines.push(format!("🚇 <b>Метро:</b> {}", escape_html(&metro)));
    }
    if let Some(address) = format_address(record) {
        lines.push(
            format!("📍 <b>Адрес:</b> {}", escape_html(&address)),
        );
    }

    lines.push(String::new());
    lines.push(
        format!(
            "📂 <b>Категория:</b> {}",
            escape_html(record.category.as_deref().unwrap_or("Не указана"))
        ),
    );
    lines.push(String::new());
    lines.push(
        format!("💎 <b>Цена продавца:</b> {} ₽", format_price(record.price)),
    );
    lines.push(
        format!(
            "🎯 <b>Рыночная цена:</b> {} ₽",
            format_price(record.target_price)
        ),
    );
    lines.push(profit_line);
    lines.push(String::new());
    lines.push(
        format!(
            "📅 <b>Размещено:</b> {}",
            escape_html(record.posted_date.as_deref().unwrap_or("Дата не указана"))
        ),
    );
    lines.push(
        format!("👁 <b>Просмотров:</b> {}", record.views_count.unwrap_or(0)),
    );
    lines.push(
        format!("👤 <b>Продавец:</b> {}", format_seller(record)),
    );
    if let Some(rating) = format_rating(record) {
        lines.push(format!("⭐ <b>Рейтинг:</b> {}", escape_html(&rating)));
    }

    let footer = vec![
        String::new(),
        format!("#️⃣ <b>Теги:</b> {}", generate_hashtags(record)),
        String::new(),
        format!(
            "🔗 <a href='{}'>Просмотреть объявление на Авито</a>",
            record.url
        ),
    ];

    finish_message(lines, footer, record)
}

fn compose_auto_ru(record: &ListingRecord, economy: i64, economy_percent: i64) -> String {
    let (header, profit_line) = if economy > 0 {
        (
            "💰 <b>ВЫГОДНЫЙ АВТОМОБИЛЬ!</b>".to_string(),
            format!(
                "💵 <b>Прибыль:</b> +{} ₽ ({economy_percent}%)",
                format_price(economy)
            ),
        )
    } else {
        (
            "🚗 <b>ИНТЕРЕСНЫЙ АВТОМОБИЛЬ</b>".to_string(),
            "⚖️ <b>Цена соответствует рынку</b>".to_string(),
        )
    };

    let mut lines = Vec::new();
    lines.push(header);
    lines.push(String::new());
    lines.push(
        format!("📦 <b>Модель:</b> {}", escape_html(&record.title)),
    );
    lines.push(
        format!(
            "📍 <b>Город:</b> {}",
            escape_html(record.city.as_deref().unwrap_or("Не указан"))
        ),
    );

    if let Some(vehicle) = &record.vehicle {
        if let Some(year) = vehicle.year {
            lines.push(format!("📅 <b>Год выпуска:</b> {year}"));
        }
        if let Some(mileage) = &vehicle.mileage {
            lines.push(format!("🛣️ <b>Пробег:</b> {}", escape_html(mileage)));
        }
        if let Some(owners) = &vehicle.owners {
            lines.push(format!("👥 <b>Владельцы:</b> {}", escape_html(owners)));
        }
        if let Some(engine) = &vehicle.engine {
            lines.push(format!("⚙️ <b>Двигатель:</b> {}", escape_html(engine)));
        }
        if let Some(transmission) = &vehicle.transmission {
            lines.push(
                format!("🔧 <b>КПП:</b> {}", escape_html(transmission)),
            );
        }
        if let Some(drive) = &vehicle.drive {
            lines.push(format!("🚗 <b>Привод:</b> {}", escape_html(drive)));
        }
        if let Some(body) = &vehicle.body {
            lines.push(format!("🚘 <b>Кузов:</b> {}", escape_html(body)));
        }
        if let Some(color) = &vehicle.color {
            lines.push(format!("🎨 <b>Цвет:</b> {}", escape_html(color)));
        }
        if let Some(steering) = &vehicle.steering {
            lines.push(format!("🎯 <b>Руль:</b> {}", escape_html(steering)));
        }
        if let Some(pts) = &vehicle.pts {
            lines.push(format!("📄 <b>ПТС:</b> {}", escape_html(pts)));
        }
    }

    if let Some(metro) = format_metro(record) {
        lines.push(format!("🚇 <b>Метро:</b> {}", escape_html(&metro)));
    }
    if let Some(address) = format_address(record) {
        lines.push(
            format!("📍 <b>Адрес:</b> {}", escape_html(&address)),
        );
    }

    lines.push(String::new());
    lines.push(
        format!("💎 <b>Цена продавца:</b> {} ₽", format_price(record.price)),
    );
    if record.target_price != record.price {
        lines.push(
            format!(
                "🎯 <b>Рыночная цена:</b> {} ₽",
                format_price(record.target_price)
            ),
        );
    }
    lines.push(profit_line);
    lines.push(String::new());
    lines.push(
        format!(
            "📅 <b>Размещено:</b> {}",
            escape_html(record.posted_date.as_deref().unwrap_or("Дата не указана"))
        ),
    );
    if let Some(views) = record.views_count {
        lines.push(format!("👁 <b>Просмотров:</b> {views}"));
    }
    lines.push(
        format!("👤 <b>Продавец:</b> {}", format_seller(record)),
    );
    if let Some(rating) = format_rating(record) {
        lines.push(format!("⭐ <b>Рейтинг:</b> {}", escape_html(&rating)));
    }
    lines.push(format!("🆔 <b>ID:</b> {}", escape_html(&record.id)));

    let footer = vec![
        String::new(),
        format!("#️⃣ <b>Теги:</b> {}", generate_hashtags(record)),
        String::new(),
        format!("🔗 <a href='{}'>Смотреть на Auto.ru</a>", record.url),
    ];

    finish_message(lines, footer, record)
}

/// Inserts the description into whatever budget remains and enforces the
/// hard cap: compute the base length first, then give the description the
/// leftovers.
fn finish_message(
    mut lines: Vec<String>,
    footer: Vec<String>,
    record: &ListingRecord,
) -> String {
    let base_len: usize = lines
        .iter()
        .chain(footer.iter())
        .map(|l| l.chars().count() + 1)
        .sum();

    if let Some(description) = record.description.as_deref() {
        let available = MAX_MESSAGE_CHARS.saturating_sub(base_len + 50);
        if available > 100 && !description.trim().is_empty() {
            let truncated = truncate_description(description, available);
            lines.push(String::new());
            lines.push(format!("📝 <b>Описание:</b> {}", escape_html(&truncated)));
        }
    }

    lines.extend(footer);
    let message = lines.join("\n");

    if message.chars().count() > MAX_MESSAGE_CHARS {
        // Escaping can push past the budget; drop the least important lines
        let less_important = ["🆔 <b>ID:", "👁 <b>Просмотров:", "⭐ <b>Рейтинг:"];
        let filtered: Vec<String> = message
            .split('\n')
            .filter(|line| !less_important.iter().any(|p| line.starts_with(p)))
            .map(|l| l.to_string())
            .collect();
        let message = filtered.join("\n");
        if message.chars().count() > MAX_MESSAGE_CHARS {
            return message.chars().take(MAX_MESSAGE_CHARS).collect();
        }
        return message;
    }

    message
}
