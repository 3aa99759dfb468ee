//! Pricing Page

use leptos::prelude::*;

use crate::api::{self, PlanInfo};
use crate::components::PlanCard;
use crate::storage;

#[component]
pub fn PricingPage() -> impl IntoView {
    let (plans, set_plans) = signal(Vec::<PlanInfo>::new());
    let (error, set_error) = signal(None::<String>);
    let (loading, set_loading) = signal(false);

    leptos::task::spawn_local(async move {
        match api::fetch_plans().await {
            Ok(list) => set_plans.set(list),
            Err(e) => set_error.set(Some(e)),
        }
    });

    let subscribe = move |plan: PlanInfo| {
        if loading.get_untracked() {
            return;
        }
        let Some(token) = storage::auth_token() else {
            set_error.set(Some("Please sign up before choosing a plan.".into()));
            return;
        };

        set_loading.set(true);
        set_error.set(None);
        leptos::task::spawn_local(async move {
            match api::create_checkout_session(&token, &plan).await {
                Ok(url) => {
                    if let Some(window) = web_sys::window() {
                        if let Err(e) = window.location().set_href(&url) {
                            tracing::warn!(error = ?e, "Could not redirect to checkout");
                        }
                    }
                }
                // No retry; the user picks a plan again
                Err(e) => set_error.set(Some(e)),
            }
            set_loading.set(false);
        });
    };

    view! {
        <div class="pricing">
            <h1>"Choose Your Plan"</h1>
            <p class="subtitle">"List your services and reach more customers"</p>

            {move || error.get().map(|e| view! { <p class="error">{e}</p> })}

            <div class="plans">
                <For
                    each=move || plans.get()
                    key=|plan| plan.name.clone()
                    children=move |plan| view! { <PlanCard plan=plan on_subscribe=Callback::new(subscribe) /> }
                />
            </div>

            <Show when=move || loading.get()>
                <p class="loading">"Redirecting to checkout..."</p>
            </Show>
        </div>
    }
}
