use mailminder_core::Tone;

/// Word in the instruction that the selected tone replaces.
pub const TONE_PLACEHOLDER: &str = "formal";

const INSTRUCTION_HEAD: &str = "Please give a formal reply to this email and don't add prompt like \
here is your email and all stuff just give me the proper response in a good way.";

const INSTRUCTION_TAIL: &str = "Also, remember not to add 'Dear [Recipient's Name]' or 'Best regards' \
in the reply or any other irrelevant things. Make sure the reply is short and simple, not of big \
length. Give a to-the-point response without adding additional info.";

/// Builds the completion prompt for `snippet` in the given tone.
///
/// The tone is substituted into the instruction before the snippet is
/// inserted, so the mail text itself is never rewritten.
pub fn build_reply_prompt(snippet: &str, tone: Tone) -> String {
    let head = INSTRUCTION_HEAD.replacen(TONE_PLACEHOLDER, tone.as_str(), 1);
    format!("{head} \n{snippet}\n{INSTRUCTION_TAIL}")
}
