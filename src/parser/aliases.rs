//! Accepted source names for every logical field.
//!
//! Uploaded documents mix English and Russian keys (`title` / `название`,
//! `modules` / `модули`, ...). Each field owns an ordered alias list; lookups
//! walk it and return the first populated match.

use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Trails,
    Modules,
    Questions,
    Title,
    Slug,
    Subtitle,
    Description,
    Icon,
    Color,
    Content,
    Type,
    Points,
    Level,
    Duration,
    RequiresSubmission,
    QuestionText,
    Options,
    CorrectAnswer,
    Explanation,
    Data,
    Id,
    Text,
    IsCorrect,
    LeftItems,
    RightItems,
    CorrectPairs,
    Items,
    CorrectOrder,
    CaseContent,
    MinCorrectRequired,
}

impl Field {
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Field::Trails => &["trails", "трейлы", "courses", "курсы", "треки"],
            Field::Modules => &["modules", "модули", "lessons", "уроки", "занятия", "chapters", "главы"],
            Field::Questions => &["questions", "вопросы", "quiz", "тест", "tests", "тесты"],
            Field::Title => &["title", "название", "name", "заголовок", "имя", "тема"],
            Field::Slug => &["slug", "слаг", "url", "id"],
            Field::Subtitle => &["subtitle", "подзаголовок", "tagline"],
            Field::Description => &["description", "описание", "summary", "аннотация"],
            Field::Icon => &["icon", "иконка", "emoji", "значок"],
            Field::Color => &["color", "цвет", "colour"],
            Field::Content => &["content", "содержание", "контент", "body", "text", "текст", "материал", "markdown"],
            Field::Type => &["type", "тип", "kind", "вид"],
            Field::Points => &["points", "очки", "баллы", "xp", "score"],
            Field::Level => &["level", "уровень", "difficulty", "сложность"],
            Field::Duration => &["duration", "длительность", "время", "time"],
            Field::RequiresSubmission => &[
                "requiresSubmission",
                "requires_submission",
                "submission",
                "требуетсяСдача",
                "сдача",
            ],
            Field::QuestionText => &["question", "вопрос", "text", "текст", "title", "prompt"],
            Field::Options => &["options", "варианты", "answers", "ответы", "choices", "variants"],
            Field::CorrectAnswer => &[
                "correctAnswer",
                "correct_answer",
                "correct",
                "правильныйОтвет",
                "правильный_ответ",
                "answer",
                "ответ",
            ],
            Field::Explanation => &["explanation", "пояснение", "объяснение", "comment", "комментарий"],
            Field::Data => &["data", "данные", "payload"],
            Field::Id => &["id", "key", "ключ"],
            Field::Text => &["text", "текст", "label", "value", "content", "title"],
            Field::IsCorrect => &["isCorrect", "is_correct", "correct", "правильный", "верный", "right"],
            Field::LeftItems => &["leftItems", "left_items", "left", "левые", "terms"],
            Field::RightItems => &["rightItems", "right_items", "right", "правые", "definitions"],
            Field::CorrectPairs => &["correctPairs", "correct_pairs", "pairs", "пары", "matches"],
            Field::Items => &["items", "элементы", "steps", "шаги"],
            Field::CorrectOrder => &["correctOrder", "correct_order", "order", "порядок"],
            Field::CaseContent => &["caseContent", "case_content", "case", "кейс", "scenario", "сценарий", "code"],
            Field::MinCorrectRequired => &["minCorrectRequired", "min_correct_required", "minCorrect", "min_correct"],
        }
    }

    /// Fields that may appear as `key: value` metadata lines in text formats.
    const METADATA: [Field; 11] = [
        Field::Title,
        Field::Slug,
        Field::Subtitle,
        Field::Description,
        Field::Icon,
        Field::Color,
        Field::Type,
        Field::Points,
        Field::Level,
        Field::Duration,
        Field::RequiresSubmission,
    ];

    /// Resolve a metadata key (`Название`, `points`, ...) to its field.
    pub fn metadata_from_key(key: &str) -> Option<Field> {
        let key = key.trim().to_lowercase();
        Self::METADATA.iter().copied().find(|field| {
            field
                .aliases()
                .iter()
                .filter(|alias| **alias != "id" && **alias != "url" && **alias != "time")
                .any(|alias| alias.to_lowercase() == key)
        })
    }
}

/// Every non-null value stored under one of the field's aliases, in alias
/// order. Exact key matches come before case-insensitive ones.
pub fn alias_values<'a>(
    obj: &'a Map<String, Value>,
    field: Field,
) -> impl Iterator<Item = &'a Value> + 'a {
    let exact = field.aliases().iter().filter_map(move |alias| obj.get(*alias));
    let loose = field.aliases().iter().flat_map(move |alias| {
        let alias = alias.to_lowercase();
        obj.iter()
            .filter(move |(k, _)| k.to_lowercase() == alias && k.as_str() != alias)
            .map(|(_, v)| v)
    });
    exact.chain(loose).filter(|v| !v.is_null())
}

pub fn first_alias<'a>(obj: &'a Map<String, Value>, field: Field) -> Option<&'a Value> {
    alias_values(obj, field).next()
}

/// String view of a field; numbers and booleans are stringified, blanks skipped.
pub fn first_str(obj: &Map<String, Value>, field: Field) -> Option<String> {
    alias_values(obj, field).find_map(|value| {
        let text = match value {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return None,
        };
        (!text.is_empty()).then_some(text)
    })
}

/// Array view of a field.
pub fn first_array(obj: &Map<String, Value>, field: Field) -> Option<&Vec<Value>> {
    alias_values(obj, field).find_map(Value::as_array)
}

/// Interpret loose truthy values: `true`, `"yes"`, `"да"`, `1`.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "yes" | "y" | "1" | "да" | "+" | "верно" | "правильно"
        ),
        _ => false,
    }
}
