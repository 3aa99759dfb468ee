//! Dashboard Page
//!
//! Landing page after hosted checkout. Runs the checkout return handler once
//! per browser session, then strips the status parameters from the URL.

use leptos::prelude::*;
use leptos_router::{
    NavigateOptions,
    hooks::{use_navigate, use_query_map},
};

use market_core::{AuthState, Notice, ReturnParams, User, checkout_return::handle_return};

use crate::api;
use crate::components::NoticeBanner;
use crate::storage;

const DASHBOARD_PATH: &str = "/dashboard";

#[component]
pub fn DashboardPage() -> impl IntoView {
    let query = use_query_map();
    let navigate = use_navigate();
    let (user, set_user) = signal(None::<User>);
    let (notice, set_notice) = signal(None::<Notice>);

    let params = query.with_untracked(|q| ReturnParams::from_lookup(|key| q.get(key)));

    leptos::task::spawn_local(async move {
        let token = storage::auth_token();
        let current = match &token {
            Some(token) => api::fetch_me(token).await.ok(),
            None => None,
        };
        let auth = current
            .as_ref()
            .map_or(AuthState::SignedOut, |u| AuthState::SignedIn(u.id.clone()));
        set_user.set(current);

        let transition = handle_return(&params, storage::processed_marker(), &auth, |update| {
            let token = token.clone().unwrap_or_default();
            async move { api::apply_optimistic_plan(&token, &update).await }
        })
        .await;

        storage::set_processed_marker(transition.marker);
        if transition.strip_params {
            navigate(
                DASHBOARD_PATH,
                NavigateOptions {
                    replace: true,
                    ..Default::default()
                },
            );
        }
        if let Some(n) = transition.notice {
            // Show the plan as stored now, optimistic or settled
            if let (Notice::PaymentSuccessful { .. }, Some(token)) = (&n, &token) {
                match api::fetch_me(token).await {
                    Ok(fresh) => set_user.set(Some(fresh)),
                    Err(e) => tracing::warn!(error = %e, "Could not refresh user"),
                }
            }
            set_notice.set(Some(n));
        }
    });

    let logout = move |_| {
        let token = storage::auth_token();
        storage::clear_session();
        set_user.set(None);
        if let Some(token) = token {
            leptos::task::spawn_local(async move {
                if let Err(e) = api::logout(&token).await {
                    tracing::warn!(error = %e, "Logout request failed");
                }
            });
        }
    };

    view! {
        <div class="dashboard">
            {move || notice.get().map(|n| view! { <NoticeBanner notice=n /> })}

            {move || match user.get() {
                Some(u) => view! {
                    <section class="account">
                        <h1>{format!("Welcome, {}", u.name.clone().unwrap_or_else(|| "provider".into()))}</h1>
                        <p class="plan">"Plan: " <strong>{u.plan_name.to_string()}</strong></p>
                        <p class="status">"Subscription: " {u.subscription_status.as_str()}</p>
                        <div class="actions">
                            <a href="/pricing" class="btn">"Change plan"</a>
                            <button class="btn" on:click=logout>"Sign out"</button>
                        </div>
                    </section>
                }
                .into_any(),
                None => view! {
                    <section class="account">
                        <p>"You are not signed in."</p>
                        <a href="/" class="btn btn-primary">"Sign up"</a>
                    </section>
                }
                .into_any(),
            }}
        </div>
    }
}
