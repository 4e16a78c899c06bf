use yew::prelude::*;
use yew_router::prelude::*;
use log::{info, Level};

mod browser;
mod config;
mod gate;
mod components {
    pub mod notification;
}
mod pages {
    pub mod unlock;
}

use pages::unlock::Unlock;


#[derive(Clone, Routable, PartialEq)]
pub enum Route {
    #[at("/")]
    Home,
    #[not_found]
    #[at("/404")]
    NotFound,
}


fn switch(routes: Route) -> Html {
    match routes {
        Route::Home => {
            info!("Rendering Unlock page");
            html! { <Unlock /> }
        },
        Route::NotFound => {
            info!("Rendering NotFound page");
            html! {
                <div class="unlock-page">
                    <h1>{"Page not found"}</h1>
                    <Link<Route> to={Route::Home}>{"Back to the unlock page"}</Link<Route>>
                </div>
            }
        },
    }
}


#[function_component]
fn App() -> Html {
    html! {
        <BrowserRouter>
            <Switch<Route> render={switch} />
        </BrowserRouter>
    }
}


fn main() {
    // Initialize console error panic hook for better error messages
    console_error_panic_hook::set_once();

    // Initialize logging
    console_log::init_with_level(Level::Info).expect("error initializing log");

    info!("Starting application");
    yew::Renderer::<App>::new().render();
}
