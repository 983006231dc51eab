//! Prompt text and canned replies for the practice assistant.

use crate::config::ChatSettings;

#[derive(Clone, Debug)]
pub struct PracticeInfo {
    pub name: String,
    pub phone: String,
}

impl PracticeInfo {
    pub fn from_settings(settings: &ChatSettings) -> Self {
        PracticeInfo {
            name: settings.practice_name.clone(),
            phone: settings.practice_phone.clone(),
        }
    }

    pub fn system_prompt(&self) -> String {
        format!(
            "You are a helpful dental assistant for {name}.\n\
             You provide information about dental services, appointments, and general oral health advice.\n\
             Be professional, friendly, and concise in your responses.\n\
             If asked about specific medical advice, recommend consulting with a dentist.\n\
             \n\
             Practice Information:\n\
             - Name: {name}\n\
             - Phone: {phone}\n\
             - Hours: Monday-Saturday 9:00 AM - 6:00 PM, Saturday closes at 2:00 PM\n\
             - Services: General dentistry, teeth cleaning, fillings, root canals, orthodontics, \
             cosmetic dentistry, teeth whitening, emergency care",
            name = self.name,
            phone = self.phone
        )
    }

    /// Full text sent to the model: system prompt, optional page context, the question.
    pub fn build(&self, message: &str, context: Option<&str>) -> String {
        let mut prompt = self.system_prompt();
        if let Some(ctx) = context.map(str::trim).filter(|c| !c.is_empty()) {
            prompt.push_str("\n\nAdditional Context: ");
            prompt.push_str(ctx);
        }
        prompt.push_str("\n\nPatient Question: ");
        prompt.push_str(message);
        prompt.push_str(
            "\n\nPlease provide a helpful, professional response about dental care, services, \
             or general oral health information. Keep responses concise and informative.",
        );
        prompt
    }

    /// Reply when the model returns no usable text.
    pub fn fallback_reply(&self) -> String {
        format!(
            "I'm here to help with your dental questions. Please call our office at {} for specific medical advice.",
            self.phone
        )
    }

    /// Reply when the provider reports quota exhaustion.
    pub fn high_demand_reply(&self) -> String {
        format!(
            "I'm currently experiencing high demand. Please try again in a minute, or call our office at {} for immediate assistance.",
            self.phone
        )
    }
}
