use crate::models::{ChatTurn, DonationKind, FocusSession, PetState};

pub const CHAT_HISTORY_TURNS: usize = 5;

const LISTING_FIELDS: &str = r#"{ "id", "name", "specialty", "location", "rating", "gender", "bio", "phone", "email", "website" (leave empty), "availableSlots": [..] }"#;

fn directory_prompt(query: &str, task: &str, field_notes: &str) -> String {
    format!(
        "Act as a medical directory API.\n\
         User Query: {query}.\n\
         Task: {task}\n\
         JSON Structure per item: {LISTING_FIELDS}\n\
         Field notes: {field_notes}\n\
         IMPORTANT: Return ONLY the JSON array."
    )
}

pub fn doctors(symptoms: &str, location: &str, preferred_gender: &str) -> String {
    directory_prompt(
        &format!(
            "Symptoms: \"{symptoms}\", Location: \"{location}\", Gender Preference: \"{preferred_gender}\""
        ),
        &format!(
            "Identify the specialist needed and list the 4-6 best rated FICTIONAL doctors near \"{location}\". \
             Prioritize quality, experience and proximity."
        ),
        "rating is a number between 4.5 and 5.0; bio explains why they stand out; \
         phone like +1 555...; availableSlots like [\"10:00 AM\", \"2:00 PM\"].",
    )
}

pub fn hospitals(need: &str, location: &str) -> String {
    directory_prompt(
        &format!("Need: \"{need}\", Location: \"{location}\""),
        "List the 4-5 best rated FICTIONAL hospitals or emergency centers in that location.",
        "specialty like \"Trauma Center\" or \"General\"; rating 4.0-5.0; gender \"N/A\"; \
         bio describes facilities; availableSlots [\"24/7 Open\"].",
    )
}

pub fn therapists(issue: &str, location: &str) -> String {
    directory_prompt(
        &format!("Mental Health Issue: \"{issue}\", Location: \"{location}\""),
        "List the 4-5 most recommended FICTIONAL therapists, psychologists or counselors in that location.",
        "specialty like \"CBT\" or \"Clinical Psychology\"; bio describes their approach; \
         availableSlots like [\"Online\", \"In-Person\"].",
    )
}

pub fn labs(test_type: &str, location: &str) -> String {
    directory_prompt(
        &format!("Lab Test: \"{test_type}\", Location: \"{location}\""),
        "List 4-6 best rated FICTIONAL pathology labs or diagnostic centers in that location.",
        "specialty like \"Pathology\" or \"Radiology\"; gender \"N/A\"; bio lists services; \
         availableSlots [\"Walk-in\"].",
    )
}

pub fn donation_centers(kind: DonationKind, location: &str, blood_group: Option<&str>) -> String {
    let blood_group = blood_group.filter(|g| !g.trim().is_empty()).unwrap_or("Any");
    directory_prompt(
        &format!(
            "\"{} Donation Centers\", Location: \"{location}\", User Blood Group: \"{blood_group}\"",
            kind.as_str()
        ),
        "List 4 reputable FICTIONAL donation centers or hospitals.",
        "specialty like \"Blood Bank\"; gender \"N/A\"; bio covers urgency or details; \
         availableSlots [\"Walk-in\"].",
    )
}

pub fn diagnosis(description: &str) -> String {
    format!(
        "Act as an expert medical diagnostician system.\n\
         Patient Description: \"{description}\"\n\
         Task: Analyze the description and provide a list of 3-5 possible medical diagnoses.\n\
         IMPORTANT: This is for informational purposes only.\n\
         Return the result as a raw JSON ARRAY.\n\
         JSON Structure per item:\n\
         {{ \"condition\": \"Name of disease/condition\", \"likelihood\": \"High\" | \"Medium\" | \"Low\", \
         \"reasoning\": \"Brief explanation based on symptoms\", \
         \"recommendation\": \"Suggested tests or immediate actions\" }}"
    )
}

pub const CERTIFICATE_INSTRUCTIONS: &str = "Analyze this medical certificate/report. \
Extract the Doctor Name, Patient Name, Diagnosis/Purpose, and Date. \
Summarize the validity and key medical details in simple terms for the patient.";

pub fn chat(message: &str, history: &[ChatTurn]) -> String {
    let skip = history.len().saturating_sub(CHAT_HISTORY_TURNS);
    let context = history[skip..]
        .iter()
        .map(|turn| format!("{}: {}", turn.sender, turn.text))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are DocBook AI, a helpful medical assistant.\n\
         Context:\n{context}\n\
         User: {message}\n\
         AI:"
    )
}

pub fn pet_coaching(pet: &PetState, last_session: Option<&FocusSession>, blocklist: &[String]) -> String {
    let blocked = if blocklist.is_empty() {
        "None defined".to_string()
    } else {
        blocklist.join(", ")
    };

    let mut prompt = format!(
        "You are a virtual pet named {}.\n\
         Current stats: Health {:.0}/100, Level {}.\n\
         The user is trying to focus and avoid these distractions: {blocked}.\n",
        pet.name,
        pet.health,
        pet.level()
    );

    match last_session {
        Some(session) => prompt.push_str(&format!(
            "The user just finished a session. Duration: {} minutes. Completed: {}. Distractions detected: {}.",
            session.duration_minutes, session.completed, session.distractions
        )),
        None => prompt.push_str(
            "The user is looking at the dashboard. Give them a short, cute, motivating sentence to start focusing.",
        ),
    }

    prompt.push_str(
        "\nKeep the response under 150 characters. Be supportive but remind them that your health \
         depends on their focus. If they had distractions, scold them gently.",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_keeps_only_recent_turns() {
        let history: Vec<ChatTurn> = (0..8)
            .map(|i| ChatTurn {
                sender: "user".into(),
                text: format!("turn {i}"),
            })
            .collect();
        let prompt = chat("hello", &history);
        assert!(!prompt.contains("turn 2"));
        assert!(prompt.contains("turn 3"));
        assert!(prompt.contains("turn 7"));
        assert!(prompt.contains("User: hello"));
    }

    #[test]
    fn donation_prompt_defaults_blood_group() {
        let prompt = donation_centers(DonationKind::Blood, "Lyon", Some("  "));
        assert!(prompt.contains("User Blood Group: \"Any\""));
        assert!(prompt.contains("BLOOD Donation Centers"));
    }

    #[test]
    fn coaching_mentions_blocklist_and_session() {
        let pet = PetState::default();
        let prompt = pet_coaching(&pet, None, &["youtube.com".into()]);
        assert!(prompt.contains("youtube.com"));
        assert!(prompt.contains("start focusing"));
    }
}
