use super::{FormError, FormField, ValidationKind, ValidationRule};
use indexmap::IndexMap;
use serde_json::json;
use strum::{Display, EnumString, VariantNames};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, VariantNames)]
#[strum(serialize_all = "snake_case")]
pub enum FormTemplate {
    EventRegistration,
    Survey,
    Contact,
    Application,
}

impl FormTemplate {
    pub fn fields(self) -> Vec<FormField> {
        match self {
            FormTemplate::EventRegistration => vec![
                FormField::new("Nom", "Nom").required(),
                FormField::new("Prenom", "Prénom").required(),
                FormField::new("Email", "Email").required(),
                FormField::new("Telephone", "Téléphone"),
                FormField::new("Participation", "Mode de participation")
                    .with_type("Choice")
                    .with_widget("Dropdown")
                    .required()
                    .with_options(json!({"choices": ["En présentiel", "En ligne"]})),
                FormField::new("Commentaires", "Commentaires").with_widget("TextArea"),
            ],
            FormTemplate::Survey => vec![
                FormField::new("Nom", "Nom"),
                FormField::new("Email", "Email"),
                FormField::new("Satisfaction", "Niveau de satisfaction")
                    .with_type("Int")
                    .with_widget("Rating")
                    .required()
                    .with_options(json!({"max": 5})),
                FormField::new("Commentaire", "Commentaires").with_widget("TextArea"),
            ],
            FormTemplate::Contact => vec![
                FormField::new("Nom", "Nom").required(),
                FormField::new("Email", "Email").required(),
                FormField::new("Objet", "Objet du message").required(),
                FormField::new("Message", "Votre message")
                    .with_widget("TextArea")
                    .required(),
            ],
            FormTemplate::Application => vec![
                FormField::new("Nom", "Nom").required(),
                FormField::new("Prenom", "Prénom").required(),
                FormField::new("Email", "Email").required(),
                FormField::new("Telephone", "Téléphone").required(),
                FormField::new("CV", "CV").with_type("Attachments").required(),
                FormField::new("LettreMotivation", "Lettre de motivation")
                    .with_widget("TextArea")
                    .required(),
                FormField::new("Disponibilite", "Date de disponibilité")
                    .with_type("Date")
                    .with_widget("Date")
                    .required(),
            ],
        }
    }
}

impl FormTemplate {
    pub fn from_name(name: &str) -> Result<Self, FormError> {
        name.parse().map_err(|_| FormError::UnknownTemplate {
            name: name.to_string(),
            available: Self::VARIANTS.to_vec(),
        })
    }
}

/// An `email_format` rule for every field named `email`, whatever its case.
pub fn email_rules(fields: &[FormField]) -> IndexMap<String, Vec<ValidationRule>> {
    fields
        .iter()
        .filter(|field| field.name.eq_ignore_ascii_case("email"))
        .map(|field| {
            (
                field.name.clone(),
                vec![ValidationRule::new(
                    ValidationKind::EmailFormat,
                    Some("Invalid email format"),
                )],
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_parse_from_snake_case() {
        let template: FormTemplate = "event_registration".parse().unwrap();
        assert_eq!(template, FormTemplate::EventRegistration);
        assert!("newsletter".parse::<FormTemplate>().is_err());
        assert_eq!(
            FormTemplate::VARIANTS,
            &["event_registration", "survey", "contact", "application"]
        );
    }

    #[test]
    fn every_template_collects_an_email() {
        for name in FormTemplate::VARIANTS {
            let template: FormTemplate = name.parse().unwrap();
            assert!(template.fields().iter().any(|f| f.name == "Email"), "{name}");
        }
    }

    #[test]
    fn unknown_template_lists_the_available_ones() {
        let err = FormTemplate::from_name("newsletter").unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown template type: newsletter. Available: event_registration, survey, contact, application"
        );
    }

    #[test]
    fn contact_template_validates_its_email() {
        let rules = email_rules(&FormTemplate::Contact.fields());
        assert_eq!(rules.len(), 1);
        assert_eq!(rules["Email"][0].kind, "email_format");
    }
}
