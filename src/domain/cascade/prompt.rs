//! User-facing alert texts and the voice prompt, per locale.

use serde::{Deserialize, Serialize};

/// Supported alert locales. Russian is the default traveler locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Ru,
    En,
}

impl Language {
    /// BCP 47 tag for the voice provider's TTS engine.
    pub fn tag(&self) -> &'static str {
        match self {
            Language::Ru => "ru-RU",
            Language::En => "en-US",
        }
    }
}

/// Alert text catalog.
pub mod texts {
    use super::Language;

    /// Spoken during a guardian call, before the DTMF gather.
    pub fn voice_panic_prompt(lang: Language, traveler_name: &str) -> String {
        match lang {
            Language::Ru => format!(
                "Тревога! Срочно свяжитесь с {}. Нажмите 1 для подтверждения.",
                traveler_name
            ),
            Language::En => format!(
                "Emergency! Contact {} immediately. Press 1 to confirm.",
                traveler_name
            ),
        }
    }

    /// Initial guardian chat alert.
    pub fn chat_alert(lang: Language, traveler_name: &str) -> String {
        match lang {
            Language::Ru => format!(
                "🚨 {} отправил сигнал тревоги. Свяжитесь с ним немедленно.",
                traveler_name
            ),
            Language::En => format!(
                "🚨 {} sent a panic signal. Contact them immediately.",
                traveler_name
            ),
        }
    }

    /// Label of the acknowledgment inline button.
    pub fn ack_button(lang: Language) -> &'static str {
        match lang {
            Language::Ru => "Я беру ответственность",
            Language::En => "I take responsibility",
        }
    }

    /// Reminder edit applied to the original alert message.
    pub fn chat_reminder(lang: Language, traveler_name: &str, n: u32) -> String {
        match lang {
            Language::Ru => format!(
                "🚨 {} отправил сигнал тревоги. Напоминание №{}: никто ещё не откликнулся.",
                traveler_name, n
            ),
            Language::En => format!(
                "🚨 {} sent a panic signal. Reminder #{}: nobody has responded yet.",
                traveler_name, n
            ),
        }
    }

    /// Terminal edit shown to the other guardians after an acknowledgment.
    pub fn chat_handled(lang: Language, guardian_name: &str) -> String {
        match lang {
            Language::Ru => format!("✅ Инцидент принят: {}.", guardian_name),
            Language::En => format!("✅ Incident handled by {}.", guardian_name),
        }
    }

    /// Terminal edit shown to guardians after a traveler cancellation.
    pub fn chat_canceled(lang: Language, traveler_name: &str) -> String {
        match lang {
            Language::Ru => format!("Отбой: {} отменил сигнал тревоги.", traveler_name),
            Language::En => format!("Stand down: {} canceled the panic signal.", traveler_name),
        }
    }

    /// Sent to the traveler once a guardian acknowledges.
    pub fn traveler_acknowledged(lang: Language, guardian_name: &str) -> String {
        match lang {
            Language::Ru => format!("{} принял ваш сигнал тревоги и свяжется с вами.", guardian_name),
            Language::En => format!("{} acknowledged your panic signal and will contact you.", guardian_name),
        }
    }

    /// Sent to the traveler when every voice alert is exhausted.
    pub fn traveler_unreachable(lang: Language) -> &'static str {
        match lang {
            Language::Ru => "Не удалось дозвониться ни до одного из ваших контактов. Попробуйте связаться с ними напрямую.",
            Language::En => "We could not reach any of your guardians. Try contacting them directly.",
        }
    }

    /// Confirmation to the traveler that the cascade started, with a
    /// cancel affordance.
    pub fn traveler_opened(lang: Language) -> &'static str {
        match lang {
            Language::Ru => "🚨 Сигнал тревоги отправлен вашим контактам.",
            Language::En => "🚨 Your panic signal was sent to your guardians.",
        }
    }

    /// Label of the traveler's cancel inline button.
    pub fn cancel_button(lang: Language) -> &'static str {
        match lang {
            Language::Ru => "Отменить тревогу",
            Language::En => "Cancel the alarm",
        }
    }

    /// Short toast shown in the chat client after a button press.
    pub fn callback_received(lang: Language) -> &'static str {
        match lang {
            Language::Ru => "Принято",
            Language::En => "Got it",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_language_is_russian() {
        assert_eq!(Language::default(), Language::Ru);
        assert_eq!(Language::default().tag(), "ru-RU");
    }

    #[test]
    fn voice_prompt_includes_traveler_name() {
        let prompt = texts::voice_panic_prompt(Language::Ru, "Анна");
        assert!(prompt.contains("Анна"));
        assert!(prompt.contains("Нажмите 1"));
    }

    #[test]
    fn reminder_carries_counter() {
        let text = texts::chat_reminder(Language::En, "Anna", 3);
        assert!(text.contains("#3"));
    }
}
