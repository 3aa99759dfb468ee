//! UI Components

use leptos::prelude::*;
use market_core::Notice;

use crate::api::PlanInfo;

/// Toast-style notice after a checkout return
#[component]
pub fn NoticeBanner(notice: Notice) -> impl IntoView {
    let class = if notice.is_error() { "notice notice-error" } else { "notice" };

    view! {
        <div class=class role="status">
            <strong class="title">{notice.title()}</strong>
            <p class="description">{notice.description()}</p>
        </div>
    }
}

/// One plan on the pricing page
#[component]
pub fn PlanCard(plan: PlanInfo, #[prop(into)] on_subscribe: Callback<PlanInfo>) -> impl IntoView {
    let class = if plan.popular { "plan featured" } else { "plan" };
    let available = plan.price_id.is_some();
    let features = plan.features.clone();
    let selected = plan.clone();

    view! {
        <div class=class>
            {plan.popular.then(|| view! { <span class="badge">"Most Popular"</span> })}
            <h2>{plan.name.clone()}</h2>
            <p class="plan-description">{plan.description.clone()}</p>
            <div class="price">{plan.price_label()}<span>"/month"</span></div>
            <ul>
                {features.into_iter().map(|f| view! { <li>{f}</li> }).collect_view()}
            </ul>
            <button
                class="btn btn-primary"
                disabled=!available
                on:click=move |_| on_subscribe.run(selected.clone())
            >
                "Subscribe"
            </button>
        </div>
    }
}
