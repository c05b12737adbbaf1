//! System prompt construction. Pure string building, no I/O.

use crate::context::GroundingContext;
use crate::relationship::Stage;

use super::router::BackendKind;

/// A fact about the user carried into the prompt, with how sure we are.
#[derive(Debug, Clone)]
pub struct RememberedFact {
    pub text: String,
    pub confidence: f64,
}

/// Everything the prompt needs about the current user.
#[derive(Debug, Clone, Default)]
pub struct PromptInputs {
    pub stage: Stage,
    pub depth: f64,
    pub rounds: i64,
    pub identity: Option<String>,
    pub interests: Vec<String>,
    pub facts: Vec<RememberedFact>,
}

fn persona(backend: BackendKind) -> &'static str {
    match backend {
        BackendKind::Knowledge => {
            "你是「澎湖通」，一位熟悉澎湖大小事的在地好朋友。\
             你熟悉巷仔內的老店、漁港的作息和只有在地人知道的去處。"
        }
        BackendKind::Traveler => {
            "你是「澎湖旅遊小幫手」，協助旅客規劃澎湖行程。\
             你熟悉交通、住宿、景點和水上活動的安排。"
        }
    }
}

fn tone(stage: Stage) -> &'static str {
    match stage {
        Stage::Initial => "語氣：禮貌而親切，用「您」稱呼，簡短自我介紹。",
        Stage::GettingToKnow => "語氣：友善自然，可以開始用「你」，偶爾追問對方的喜好。",
        Stage::Familiar => "語氣：像認識一陣子的朋友，可以提起之前聊過的內容。",
        Stage::Friend => "語氣：像老朋友聊天，輕鬆隨意，可以開點小玩笑。",
    }
}

/// Build the system prompt for one turn.
pub fn system_prompt(backend: BackendKind, inputs: &PromptInputs) -> String {
    let mut prompt = String::new();
    prompt.push_str(persona(backend));
    prompt.push_str("\n\n一律使用繁體中文（台灣）回覆。\n");
    prompt.push_str(tone(inputs.stage));
    prompt.push('\n');
    if inputs.rounds > 0 {
        prompt.push_str(&format!(
            "你們已經聊過{}輪，熟悉度約{:.0}/100。\n",
            inputs.rounds, inputs.depth
        ));
    }

    if let Some(identity) = &inputs.identity {
        let line = match identity.as_str() {
            "local" => "對方是澎湖在地人。",
            "visited" => "對方來過澎湖。",
            "planning" => "對方正在計畫第一次來澎湖。",
            _ => "",
        };
        if !line.is_empty() {
            prompt.push_str(line);
            prompt.push('\n');
        }
    }
    if !inputs.interests.is_empty() {
        prompt.push_str(&format!("對方感興趣的主題：{}。\n", inputs.interests.join("、")));
    }
    for fact in &inputs.facts {
        // Low-confidence facts are hedged instead of asserted.
        if fact.confidence >= 0.7 {
            prompt.push_str(&format!("已知：{}\n", fact.text));
        } else {
            prompt.push_str(&format!("可能（不確定時請委婉確認）：{}\n", fact.text));
        }
    }

    prompt.push_str(
        "\n回答時只根據下方提供的參考資料與一般常識，不要編造店家、價格或營業時間。\
         沒有把握就直說不確定。",
    );
    prompt
}

/// Render grounding data as a reference block, labelled by provenance.
/// Returns `None` when there is nothing to show.
pub fn render_grounding(context: &GroundingContext) -> Option<String> {
    if context.is_empty() {
        return None;
    }
    let mut block = String::from("參考資料：\n");
    for place in &context.locations {
        let label = if place.is_external {
            "【外部搜尋，未經在地驗證】"
        } else {
            "【在地驗證】"
        };
        block.push_str(&format!("{label}{}（{}）\n", place.name, place.address));
    }
    for item in &context.knowledge {
        block.push_str(&format!("【在地分享】{}\n", item.text));
    }
    Some(block)
}
