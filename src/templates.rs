//! HTML email bodies, rendered with maud so every interpolated value is escaped.

use maud::{html, Markup, DOCTYPE};

use crate::mailer::Email;
use crate::models::ContactForm;

const EXCERPT_CHARS: usize = 200;
const BRAND: &str = "#5b2a86";
const CARD_STYLE: &str =
    "max-width:560px;margin:auto;background:#fff;border-radius:8px;padding:24px";
const BUTTON_STYLE: &str = "color:#fff;padding:10px 18px;border-radius:6px;text-decoration:none";

pub fn excerpt(s: &str) -> String {
    let mut cut: String = s.chars().take(EXCERPT_CHARS).collect();
    if s.chars().count() > EXCERPT_CHARS {
        cut.push('…');
    }
    cut
}

fn layout(heading: &str, body: Markup) -> String {
    html! {
        (DOCTYPE)
        html {
            body style="font-family:Helvetica,Arial,sans-serif;background:#f6f6f9;padding:24px" {
                div style=(CARD_STYLE) {
                    h2 style={ "color:" (BRAND) ";margin-top:0" } { (heading) }
                    (body)
                    p style="color:#888;font-size:12px;margin-top:32px" {
                        "The XXperiment by Medicoz Infosystems"
                    }
                }
            }
        }
    }
    .into_string()
}

fn button(href: &str, label: &str) -> Markup {
    html! {
        p {
            a href=(href) style={ "background:" (BRAND) ";" (BUTTON_STYLE) } { (label) }
        }
    }
}

pub fn verification(to: &str, username: &str, link: &str) -> Email {
    let body = html! {
        p { "Hi " (username) "," }
        p { "Confirm your email to start posting in The XXperiment. The link expires in 24 hours." }
        (button(link, "Verify email"))
    };
    Email {
        to: to.into(),
        subject: "Verify your email".into(),
        html: layout("Welcome to The XXperiment", body),
    }
}

pub fn new_comment(to: &str, actor: &str, post_title: &str, content: &str, link: &str) -> Email {
    let body = html! {
        p { strong { (actor) } " commented on your post " em { (post_title) } ":" }
        blockquote { (excerpt(content)) }
        (button(link, "View discussion"))
    };
    Email {
        to: to.into(),
        subject: format!("{actor} commented on your post"),
        html: layout("New comment", body),
    }
}

pub fn new_reply(to: &str, actor: &str, post_title: &str, content: &str, link: &str) -> Email {
    let body = html! {
        p { strong { (actor) } " replied to your comment on " em { (post_title) } ":" }
        blockquote { (excerpt(content)) }
        (button(link, "View reply"))
    };
    Email {
        to: to.into(),
        subject: format!("{actor} replied to your comment"),
        html: layout("New reply", body),
    }
}

pub fn new_like(to: &str, actor: &str, what: &str, post_title: &str, link: &str) -> Email {
    let body = html! {
        p { strong { (actor) } " liked your " (what) " on " em { (post_title) } "." }
        (button(link, "Open post"))
    };
    Email {
        to: to.into(),
        subject: format!("{actor} liked your {what}"),
        html: layout("Someone liked your contribution", body),
    }
}

pub fn contact_alert(to: &str, form: &ContactForm, admin_link: &str) -> Email {
    let body = html! {
        p { strong { "Intent:" } " " (form.intent.label()) }
        p { strong { "From:" } " " (form.name) " <" (form.email) ">" }
        p { strong { "Organization:" } " " (form.organization.as_deref().unwrap_or("not given")) }
        blockquote { (form.message) }
        (button(admin_link, "Open admin panel"))
    };
    Email {
        to: to.into(),
        subject: format!("New {} enquiry from {}", form.intent.label(), form.name),
        html: layout("New contact submission", body),
    }
}

pub fn contact_reply(form: &ContactForm, reply: &str) -> Email {
    let body = html! {
        p { "Hi " (form.name) "," }
        @for para in reply.split("\n\n") {
            p {
                @for (i, line) in para.split('\n').enumerate() {
                    @if i > 0 { br; }
                    (line)
                }
            }
        }
        hr;
        p style="color:#888" { "Your original message:" }
        blockquote style="color:#888" { (form.message) }
    };
    Email {
        to: form.email.clone(),
        subject: format!("Re: your {} enquiry", form.intent.label().to_lowercase()),
        html: layout("Medicoz Infosystems", body),
    }
}
