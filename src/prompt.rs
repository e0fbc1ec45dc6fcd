//! Prompt assembly.
//!
//! Builds the fixed two-message prompt: a system instruction template that
//! pins the output contract (strict JSON, codes only from the candidate
//! block, at most 3 suggestions, conservative confidence, `needs_review`
//! on uncertainty), and a user message embedding the grounding block and
//! the note inside delimiting tags. Stateless; identical structure for
//! every request.

use serde::{Deserialize, Serialize};

/// Message role in a chat completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One chat message, immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// The fixed system instruction template.
pub const SYSTEM_PROMPT: &str = r#"Du er en medisinsk kodeassistent i allmennpraksis.
Oppgave: Foreslå ICPC-2-koder for et konsultasjonsnotat.

Regler:
1) Returner KUN gyldig JSON som matcher skjemaet nedenfor. Ingen fritekst.
2) Velg koder KUN fra listen i <icpc2_kandidater>.
3) Maks 3 forslag.
4) Symptom vs. diagnose: Hvis diagnosen ikke er tydelig etablert, prioriter symptomkode (komponent 1) fremfor sykdomsdiagnose (komponent 7).
5) Prosesskoder (komponent 2–6) kun ved eksplisitt prosess (screening, henvisning, sykmelding, prøver, behandling, administrativt).
6) For hver kode: kort begrunnelse og 1–3 tekstbevis (spans) ordrett fra notatet (angi gjerne seksjon).
7) Sett confidence 0.0–1.0 konservativt. Bruk needs_review: true ved lav sikkerhet eller mulig feilkode.
8) Ingen kjede-resonnering. Ikke avslør interne steg.

Mapping-hjelp (om du trenger):
- 01–29 -> komponent 1 (symptomer/plager)
- 70–99 -> komponent 7 (diagnoser)
- 30–69 -> prosesskoder (2–6). Om mulig: 30–39 (2 diagnostikk/screening), 40–49 (4 testresultat),
  50–59 (3 behandling/prosedyre/medikasjon), 60–69 (5–6 administrativ/henvisning/annet). Bruk tittelteksten til å avgjøre.

Output-skjema (JSON):
{
  "top_k": [
    {
      "code": "ICPC2_CODE",
      "title": "Norsk/Dansk tittel",
      "component": 1,
      "confidence": 0.0,
      "evidence_spans": [
        {"text": "ordrett sitat fra notatet", "section": "Anamnese|Status|Vurdering|Plan|Ukjent"}
      ],
      "alternatives": ["ALT1", "ALT2"],
      "needs_review": false
    }
  ],
  "notes": "Kort kommentar (valgfritt)."
}
"#;

/// Build the two prompt messages for one request.
pub fn build_messages(note_text: &str, grounding: &str) -> [ChatMessage; 2] {
    let user_content = format!(
        "Du får et konsultasjonsnotat mellom <note>-tagger og en liste av tillatte ICPC-2-koder i <icpc2_kandidater>.\n\
         Returner KUN JSON iht. skjemaet. Ikke skriv noe annet.\n\
         \n\
         <icpc2_kandidater>\n\
         {grounding}\n\
         </icpc2_kandidater>\n\
         \n\
         <note>\n\
         {note_text}\n\
         </note>\n"
    );

    [
        ChatMessage {
            role: Role::System,
            content: SYSTEM_PROMPT.to_string(),
        },
        ChatMessage {
            role: Role::User,
            content: user_content,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_exactly_two_messages() {
        let messages = build_messages("Hoste 5 dager", "R05 | Hoste | component:1 | chapter:R");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::User);
    }

    #[test]
    fn system_message_is_the_fixed_template() {
        let messages = build_messages("notat", "");
        assert_eq!(messages[0].content, SYSTEM_PROMPT);
        assert!(messages[0].content.contains("Maks 3 forslag"));
        assert!(messages[0].content.contains("\"top_k\""));
    }

    #[test]
    fn user_message_embeds_grounding_and_note_in_tags() {
        let grounding = "R05 | Hoste | component:1 | chapter:R";
        let note = "Anamnese: Hoste 5 dager, feber 38.2";
        let messages = build_messages(note, grounding);
        let user = &messages[1].content;

        let candidates_open = user.find("<icpc2_kandidater>").unwrap();
        let candidates_close = user.find("</icpc2_kandidater>").unwrap();
        let grounding_at = user.find(grounding).unwrap();
        assert!(candidates_open < grounding_at && grounding_at < candidates_close);

        let note_open = user.find("<note>").unwrap();
        let note_close = user.find("</note>").unwrap();
        let note_at = user.find(note).unwrap();
        assert!(note_open < note_at && note_at < note_close);
    }

    #[test]
    fn messages_serialize_with_lowercase_roles() {
        let messages = build_messages("notat", "");
        let json = serde_json::to_string(&messages[0]).unwrap();
        assert!(json.starts_with("{\"role\":\"system\""));
    }
}
