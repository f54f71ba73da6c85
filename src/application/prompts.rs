//! 提示词模板
//!
//! 每种调用（单次故事、大纲、章节、连续性摘要、尾声）都有德语和英语两套模板。
//! 只拼装文本，不做任何服务调用。

use crate::domain::story::{ChapterPlan, ChapterPlanEntry, ContinuityContext, GenerationRequest, Language};
use crate::domain::ValidationFailure;

use super::ports::{PromptKind, PromptSpec};

/// 词与 token 的经验换算比
pub const TOKEN_WORD_RATIO: f64 = 1.6;

/// 单次调用的 token 上限
pub const DEFAULT_MAX_TOKENS_PER_CALL: u32 = 15_000;

pub const STORY_TEMPERATURE: f32 = 0.75;
pub const CHAPTER_TEMPERATURE: f32 = 0.75;
pub const OUTLINE_TEMPERATURE: f32 = 0.7;
pub const CONTINUITY_TEMPERATURE: f32 = 0.55;
pub const EPILOGUE_TEMPERATURE: f32 = 0.7;

const OUTLINE_MAX_TOKENS: u32 = 8_000;
const CONTINUITY_MAX_TOKENS: u32 = 1_500;
const EPILOGUE_MAX_TOKENS: u32 = 3_500;

/// 单次故事的 token 预算
pub fn story_token_budget(words: u32, cap: u32) -> u32 {
    ((words as f64 * TOKEN_WORD_RATIO * 1.1) as u32).clamp(1, cap)
}

/// 章节的 token 预算（章节提示词更长，留出额外余量）
pub fn chapter_token_budget(words: u32, cap: u32) -> u32 {
    ((words as f64 * TOKEN_WORD_RATIO * 1.4) as u32 + 600).clamp(1, cap)
}

/// 提示词构建器
pub struct PromptBuilder<'a> {
    request: &'a GenerationRequest,
    max_tokens_per_call: u32,
}

impl<'a> PromptBuilder<'a> {
    pub fn new(request: &'a GenerationRequest, max_tokens_per_call: u32) -> Self {
        Self {
            request,
            max_tokens_per_call: max_tokens_per_call.max(1),
        }
    }

    fn language(&self) -> Language {
        self.request.language()
    }

    fn setting(&self) -> &str {
        match (self.request.setting().is_empty(), self.language()) {
            (false, _) => self.request.setting(),
            (true, Language::German) => "frei wählbar",
            (true, Language::English) => "open",
        }
    }

    fn extra_block(&self) -> String {
        match (self.request.extra_instructions(), self.language()) {
            (Some(extra), Language::German) => format!("\n\n**Zusätzliche Anweisungen:**\n{}", extra),
            (Some(extra), Language::English) => format!("\n\n**Additional Instructions:**\n{}", extra),
            (None, _) => String::new(),
        }
    }

    /// 单次生成整篇故事
    pub fn story(&self, target_words: u32, bounds: (u32, u32)) -> PromptSpec {
        let r = self.request;
        let (system, user) = match self.language() {
            Language::German => (
                format!(
                    "Du bist ein erfahrener Autor von Kurzgeschichten in deutscher Sprache. \
Schreibe eine fesselnde, in sich abgeschlossene Geschichte.\n\n\
Titel: {}\nGrundidee: {}\nSetting: {}\nZiel-Wortanzahl: ca. {} Wörter (mindestens {}, höchstens {}).\n\n\
Richtlinien:\n\
- Klarer, abwechslungsreicher Stil; vermeide Wiederholungen von Wörtern und Satzmustern.\n\
- Show, don't tell: Gefühle und Atmosphäre durch Handlung, Dialog und Sinneseindrücke.\n\
- Klarer Anfang, Mittelteil und ein befriedigendes, abgeschlossenes Ende.\n\
- Beende die Geschichte niemals mitten im Satz.\n\
- Gib nur den Geschichtentext aus, ohne Überschrift und ohne Kommentare.{}",
                    r.title(), r.premise(), self.setting(), target_words, bounds.0, bounds.1, self.extra_block()
                ),
                format!(
                    "Bitte schreibe die Geschichte '{}' mit ca. {} Wörtern.",
                    r.title(),
                    target_words
                ),
            ),
            Language::English => (
                format!(
                    "You are an experienced author of short fiction in English. \
Write a compelling, self-contained story.\n\n\
Title: {}\nPremise: {}\nSetting: {}\nTarget length: approx. {} words (at least {}, at most {}).\n\n\
Guidelines:\n\
- Clear, varied prose; avoid repeating words and sentence patterns.\n\
- Show, don't tell: convey emotion and atmosphere through action, dialogue and sensory detail.\n\
- A clear beginning, middle and a satisfying, conclusive ending.\n\
- Never end mid-sentence.\n\
- Output only the story text, without a title and without commentary.{}",
                    r.title(), r.premise(), self.setting(), target_words, bounds.0, bounds.1, self.extra_block()
                ),
                format!(
                    "Please write the story '{}' in approximately {} words.",
                    r.title(),
                    target_words
                ),
            ),
        };

        PromptSpec {
            kind: PromptKind::Story,
            system,
            user,
            max_tokens: story_token_budget(bounds.1.max(target_words), self.max_tokens_per_call),
            temperature: STORY_TEMPERATURE,
        }
    }

    /// 章节大纲
    pub fn outline(&self, targets: &[u32]) -> PromptSpec {
        let r = self.request;
        let count = targets.len();
        let total: u32 = targets.iter().sum();
        let word = self.language().chapter_word();
        let (system, user) = match self.language() {
            Language::German => (
                format!(
                    "Du bist ein erfahrener Autor und Story-Entwickler. Erstelle eine Plot-Outline \
für eine Geschichte mit genau {count} Kapiteln.\n\n\
Titel: {}\nGrundidee: {}\nSetting: {}\nGesamtumfang: ca. {total} Wörter ({})\n\n\
Beginne jeden Kapitelabschnitt in einer eigenen Zeile mit '## {word} N: <Kapiteltitel>' \
und schreibe darunter einen Absatz mit den wichtigsten Ereignissen, den beteiligten Figuren \
und der Entwicklung in diesem Kapitel. Nummeriere die Kapitel von 1 bis {count}. \
Achte auf Kausalität und einen logischen Spannungsbogen über alle Kapitel.{}",
                    r.title(), r.premise(), self.setting(), self.language().display_name(), self.extra_block()
                ),
                format!(
                    "Bitte erstelle die Outline für die {}-teilige Geschichte '{}'.",
                    count,
                    r.title()
                ),
            ),
            Language::English => (
                format!(
                    "You are a seasoned author and story developer. Create a plot outline \
for a story with exactly {count} chapters.\n\n\
Title: {}\nPremise: {}\nSetting: {}\nTotal length: approx. {total} words ({})\n\n\
Start every chapter section on its own line with '## {word} N: <chapter title>' \
followed by one paragraph describing the key events, the characters involved and how \
the story develops in that chapter. Number the chapters from 1 to {count}. \
Keep the chain of cause and effect consistent across all chapters.{}",
                    r.title(), r.premise(), self.setting(), self.language().display_name(), self.extra_block()
                ),
                format!(
                    "Please create the outline for the {}-part story '{}'.",
                    count,
                    r.title()
                ),
            ),
        };

        PromptSpec {
            kind: PromptKind::Outline,
            system,
            user,
            max_tokens: OUTLINE_MAX_TOKENS.min(self.max_tokens_per_call),
            temperature: OUTLINE_TEMPERATURE,
        }
    }

    /// 单个章节
    ///
    /// `previous_failure` 为上一次尝试的校验失败，重试时追加到提示词中。
    pub fn chapter(
        &self,
        entry: &ChapterPlanEntry,
        total: u32,
        context: &ContinuityContext,
        bounds: (u32, u32),
        previous_failure: Option<&ValidationFailure>,
    ) -> PromptSpec {
        let r = self.request;
        let language = self.language();
        let index = entry.index();
        let target = entry.target_word_count();

        let mut system = match language {
            Language::German => format!(
                "Du bist ein erfahrener Autor. Schreibe Kapitel {index} von {total} der Geschichte '{}'.\n\n\
Grundidee: {}\nSetting: {}\n\n\
1. WAS SOLL PASSIEREN? Halte dich strikt an den Plan für dieses Kapitel:\n\
--- KAPITEL {index}: {} ---\n{}\n--- ENDE ---\n",
                r.title(), r.premise(), self.setting(), entry.heading(), entry.summary()
            ),
            Language::English => format!(
                "You are an experienced author. Write chapter {index} of {total} of the story '{}'.\n\n\
Premise: {}\nSetting: {}\n\n\
1. WHAT HAPPENS? Follow the plan for this chapter strictly:\n\
--- CHAPTER {index}: {} ---\n{}\n--- END ---\n",
                r.title(), r.premise(), self.setting(), entry.heading(), entry.summary()
            ),
        };

        if context.is_empty() {
            system.push_str(match language {
                Language::German => "\n2. Dies ist das erste Kapitel. Es gibt keinen vorherigen Kontext.\n",
                Language::English => "\n2. This is the first chapter. There is no previous context.\n",
            });
        } else {
            let prev = context.through_chapter();
            match language {
                Language::German => system.push_str(&format!(
                    "\n2. WAS IST BEREITS PASSIERT? Bleibe konsistent mit der bisherigen Handlung \
und wiederhole keine abgeschlossenen Handlungsstränge:\n\
--- ZUSAMMENFASSUNG BIS KAPITEL {prev} ---\n{}\n--- ENDE ---\n\n\
3. WIE ENDETE KAPITEL {prev}? Schließe nahtlos an, ohne Sätze zu kopieren:\n\
--- ENDE VON KAPITEL {prev} ---\n...{}\n--- ENDE ---\n",
                    context.running_summary(),
                    context.recent_ending()
                )),
                Language::English => system.push_str(&format!(
                    "\n2. WHAT HAS HAPPENED? Stay consistent with the story so far \
and do not repeat resolved plot threads:\n\
--- SUMMARY THROUGH CHAPTER {prev} ---\n{}\n--- END ---\n\n\
3. HOW DID CHAPTER {prev} END? Continue seamlessly without copying sentences:\n\
--- END OF CHAPTER {prev} ---\n...{}\n--- END ---\n",
                    context.running_summary(),
                    context.recent_ending()
                )),
            }
        }

        match language {
            Language::German => system.push_str(&format!(
                "\nUmfang: ca. {target} Wörter (mindestens {}, höchstens {}). \
Abwechslungsreicher Stil, glaubwürdige Dialoge, keine Wiederholungen. \
Gib nur den Kapiteltext aus, ohne Überschrift. Beende das Kapitel mit einem vollständigen Satz.",
                bounds.0, bounds.1
            )),
            Language::English => system.push_str(&format!(
                "\nLength: approx. {target} words (at least {}, at most {}). \
Varied prose, believable dialogue, no repetition. \
Output only the chapter text, without a heading. End the chapter with a complete sentence.",
                bounds.0, bounds.1
            )),
        }

        if let Some(failure) = previous_failure {
            system.push_str("\n\n");
            system.push_str(&amendment(language, failure, bounds));
        }
        system.push_str(&self.extra_block());

        let user = match language {
            Language::German => format!(
                "Bitte schreibe jetzt Kapitel {} der Geschichte '{}'.",
                index,
                r.title()
            ),
            Language::English => format!(
                "Please write chapter {} of the story '{}' now.",
                index,
                r.title()
            ),
        };

        PromptSpec {
            kind: PromptKind::Chapter { index },
            system,
            user,
            max_tokens: chapter_token_budget(bounds.1.max(target), self.max_tokens_per_call),
            temperature: CHAPTER_TEMPERATURE,
        }
    }

    /// 更新滚动摘要
    pub fn continuity(&self, previous_summary: &str, index: u32, chapter_text: &str) -> PromptSpec {
        let (system, user) = match self.language() {
            Language::German => (
                format!(
                    "Du pflegst eine laufende Zusammenfassung der gesamten bisherigen Handlung \
einer Geschichte, damit der Autor konsistent weiterschreiben kann.\n\n\
Bisherige Zusammenfassung:\n{}\n\n\
--- NEUES KAPITEL {index} ---\n{}\n--- ENDE ---\n\n\
Aktualisiere die Zusammenfassung um die wichtigsten neuen Ereignisse, Entscheidungen \
und emotionalen Zustände der Figuren, offene Handlungsstränge und die genaue Situation am \
Ende von Kapitel {index}. Höchstens 250 Wörter. Gib nur die neue Zusammenfassung aus.",
                    if previous_summary.is_empty() { "Die Geschichte beginnt." } else { previous_summary },
                    chapter_text
                ),
                "Bitte aktualisiere die laufende Zusammenfassung.".to_string(),
            ),
            Language::English => (
                format!(
                    "You maintain a running summary of the entire plot of a story so far, \
so that the author can continue consistently.\n\n\
Summary so far:\n{}\n\n\
--- NEW CHAPTER {index} ---\n{}\n--- END ---\n\n\
Update the summary with the key new events, the characters' decisions and emotional \
states, open plot threads and the exact situation at the end of chapter {index}. \
At most 250 words. Output only the new summary.",
                    if previous_summary.is_empty() { "The story begins." } else { previous_summary },
                    chapter_text
                ),
                "Please update the running summary.".to_string(),
            ),
        };

        PromptSpec {
            kind: PromptKind::Continuity { index },
            system,
            user,
            max_tokens: CONTINUITY_MAX_TOKENS.min(self.max_tokens_per_call),
            temperature: CONTINUITY_TEMPERATURE,
        }
    }

    /// 尾声
    pub fn epilogue(&self, plan: &ChapterPlan, context: &ContinuityContext) -> PromptSpec {
        let r = self.request;
        let language = self.language();
        let outline = plan.render_outline(r.title(), language);
        let (system, user) = match language {
            Language::German => (
                format!(
                    "Du bist ein talentierter Autor. Schreibe einen befriedigenden Epilog für die \
Geschichte '{}'.\n\n--- OUTLINE ---\n{}\n--- ENDE ---\n\n\
--- BISHERIGE HANDLUNG ---\n{}\n--- ENDE ---\n\n\
--- ENDE DES LETZTEN KAPITELS ---\n...{}\n--- ENDE ---\n\n\
Löse die wichtigsten offenen Handlungsstränge auf, führe die Figuren zu einem sinnvollen \
Abschluss und greife die Hauptthemen auf. Umfang: ca. 500 bis 1000 Wörter. \
Gib nur den Text des Epilogs aus, ohne Überschrift.{}",
                    r.title(), outline, context.running_summary(), context.recent_ending(), self.extra_block()
                ),
                format!("Bitte schreibe den Epilog für '{}'.", r.title()),
            ),
            Language::English => (
                format!(
                    "You are a talented author. Write a satisfying epilogue for the story '{}'.\n\n\
--- OUTLINE ---\n{}\n--- END ---\n\n\
--- STORY SO FAR ---\n{}\n--- END ---\n\n\
--- END OF THE LAST CHAPTER ---\n...{}\n--- END ---\n\n\
Resolve the main open plot threads, bring the characters to a meaningful close and \
revisit the central themes. Length: approx. 500 to 1000 words. \
Output only the epilogue text, without a heading.{}",
                    r.title(), outline, context.running_summary(), context.recent_ending(), self.extra_block()
                ),
                format!("Please write the epilogue for '{}'.", r.title()),
            ),
        };

        PromptSpec {
            kind: PromptKind::Epilogue,
            system,
            user,
            max_tokens: EPILOGUE_MAX_TOKENS.min(self.max_tokens_per_call),
            temperature: EPILOGUE_TEMPERATURE,
        }
    }
}

/// 重试时追加的纠正说明
fn amendment(language: Language, failure: &ValidationFailure, bounds: (u32, u32)) -> String {
    match (language, failure) {
        (Language::German, ValidationFailure::Empty) => {
            "WICHTIG: Die letzte Antwort war leer. Schreibe den vollständigen Kapiteltext.".to_string()
        }
        (Language::German, ValidationFailure::TooShort { words, .. }) => format!(
            "WICHTIG: Der letzte Entwurf war mit {} Wörtern zu kurz. Schreibe mindestens {} Wörter.",
            words, bounds.0
        ),
        (Language::German, ValidationFailure::TooLong { words, .. }) => format!(
            "WICHTIG: Der letzte Entwurf war mit {} Wörtern zu lang. Schreibe höchstens {} Wörter.",
            words, bounds.1
        ),
        (Language::German, ValidationFailure::FailureMarker { .. }) => {
            "WICHTIG: Schreibe ausschließlich den Kapiteltext, ohne Entschuldigungen oder Kommentare.".to_string()
        }
        (Language::English, ValidationFailure::Empty) => {
            "IMPORTANT: The last response was empty. Write the complete chapter text.".to_string()
        }
        (Language::English, ValidationFailure::TooShort { words, .. }) => format!(
            "IMPORTANT: The last draft was too short at {} words. Write at least {} words.",
            words, bounds.0
        ),
        (Language::English, ValidationFailure::TooLong { words, .. }) => format!(
            "IMPORTANT: The last draft was too long at {} words. Write at most {} words.",
            words, bounds.1
        ),
        (Language::English, ValidationFailure::FailureMarker { .. }) => {
            "IMPORTANT: Write only the chapter text, without apologies or commentary.".to_string()
        }
    }
}
