//! Home Page

use leptos::prelude::*;
use leptos_router::hooks::use_navigate;

use crate::api;
use crate::storage;

#[component]
pub fn HomePage() -> impl IntoView {
    let (name, set_name) = signal(String::new());
    let (email, set_email) = signal(String::new());
    let (error, set_error) = signal(None::<String>);
    let navigate = use_navigate();

    let join = move |_| {
        let name = name.get();
        let email = email.get();
        if name.trim().is_empty() || email.trim().is_empty() {
            set_error.set(Some("Name and email are required.".into()));
            return;
        }

        let navigate = navigate.clone();
        leptos::task::spawn_local(async move {
            match api::signup(&name, &email).await {
                Ok(signup) => {
                    storage::set_auth_token(&signup.token);
                    tracing::info!(user_id = %signup.user.id, "Signed up");
                    navigate("/pricing", Default::default());
                }
                Err(e) => set_error.set(Some(e)),
            }
        });
    };

    view! {
        <div class="home">
            <header class="hero">
                <h1>"Service Marketplace"</h1>
                <p class="tagline">"Offer your services to customers nearby"</p>
                <div class="cta">
                    <a href="/pricing" class="btn">"View Plans"</a>
                    <a href="/dashboard" class="btn">"Dashboard"</a>
                </div>
            </header>

            <section class="signup">
                <h2>"Become a provider"</h2>
                <input
                    type="text"
                    placeholder="Your name"
                    prop:value=move || name.get()
                    on:input=move |ev| set_name.set(event_target_value(&ev))
                />
                <input
                    type="email"
                    placeholder="you@example.com"
                    prop:value=move || email.get()
                    on:input=move |ev| set_email.set(event_target_value(&ev))
                />
                <button class="btn btn-primary" on:click=join>"Join"</button>
                {move || error.get().map(|e| view! { <p class="error">{e}</p> })}
            </section>
        </div>
    }
}
