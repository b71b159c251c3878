use anyhow::{Context, Result};
use lopdf::{
    content::{Content, Operation},
    dictionary, Document, Object, ObjectId, Stream,
};
use shared::domain::{DayOfWeek, DietPlan};

const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 50;
const LINE_HEIGHT: i64 = 14;
const FONT_SIZE: i64 = 10;
const TITLE_SIZE: i64 = 16;
pub(crate) const LINES_PER_PAGE: usize = 52;
const WRAP_AT: usize = 90;

enum Line {
    Title(String),
    Text(String),
    Blank,
}

/// Renders a plan as a paginated A4 document in Helvetica.
pub fn render_pdf(plan: &DietPlan) -> Result<Vec<u8>> {
    let lines = layout(plan);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for chunk in lines.chunks(LINES_PER_PAGE) {
        let page_id = add_page(&mut doc, pages_id, chunk)?;
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).context("failed to write pdf")?;
    Ok(bytes)
}

fn add_page(doc: &mut Document, pages_id: ObjectId, lines: &[Line]) -> Result<ObjectId> {
    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("TL", vec![LINE_HEIGHT.into()]),
        Operation::new("Td", vec![MARGIN.into(), (PAGE_HEIGHT - MARGIN).into()]),
    ];
    for line in lines {
        let (size, text) = match line {
            Line::Title(text) => (TITLE_SIZE, text.as_str()),
            Line::Text(text) => (FONT_SIZE, text.as_str()),
            Line::Blank => (FONT_SIZE, ""),
        };
        operations.push(Operation::new("Tf", vec!["F1".into(), size.into()]));
        operations.push(Operation::new("Tj", vec![Object::string_literal(ascii(text))]));
        operations.push(Operation::new("T*", vec![]));
    }
    operations.push(Operation::new("ET", vec![]));

    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        content.encode().context("failed to encode page content")?,
    ));
    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    }))
}

fn layout(plan: &DietPlan) -> Vec<Line> {
    let mut lines = vec![
        Line::Title(plan.name.clone()),
        Line::Text(format!(
            "Week of {} to {}  |  Target {} kcal/day",
            plan.week_start, plan.week_end, plan.target_calories
        )),
        Line::Text(format!("{} meals", plan.meals.len())),
    ];

    for day in DayOfWeek::ALL {
        let mut meals: Vec<_> = plan.meals_for_day(day).collect();
        if meals.is_empty() {
            continue;
        }
        meals.sort_by_key(|meal| meal.meal_type);
        let total: f64 = meals.iter().map(|meal| meal.calories).sum();
        lines.push(Line::Blank);
        lines.push(Line::Title(format!(
            "{} {}  ({total:.0} kcal)",
            day.label(),
            plan.date_of(day)
        )));
        for meal in meals {
            lines.push(Line::Text(format!(
                "{}: {}",
                meal.meal_type.label(),
                meal.name
            )));
            lines.push(Line::Text(format!(
                "    {:.0} kcal  |  protein {:.0} g  |  carbs {:.0} g  |  fat {:.0} g",
                meal.calories, meal.protein_g, meal.carbs_g, meal.fat_g
            )));
            if !meal.ingredients.is_empty() {
                let joined = meal.ingredients.join(", ");
                lines.extend(
                    wrap(&format!("    Ingredients: {joined}"), WRAP_AT)
                        .into_iter()
                        .map(Line::Text),
                );
            }
        }
    }
    lines
}

/// Breaks `text` at spaces. Continuation lines keep the leading indent of
/// the first line plus two spaces.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let body = text.trim_start();
    let indent = &text[..text.len() - body.len()];
    let continuation = format!("{indent}  ");

    let mut out = Vec::new();
    let mut current = indent.to_string();
    let mut has_word = false;
    for word in body.split_whitespace() {
        if has_word && current.len() + 1 + word.len() > width {
            out.push(std::mem::replace(&mut current, continuation.clone()));
            has_word = false;
        }
        if has_word {
            current.push(' ');
        }
        current.push_str(word);
        has_word = true;
    }
    if has_word {
        out.push(current);
    }
    out
}

/// Helvetica with the standard encoding only covers ASCII reliably.
fn ascii(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '?' })
        .collect()
}
