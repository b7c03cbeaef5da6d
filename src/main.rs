mod gateway;
mod identity;
mod manipulation;
mod tree_app;
mod upload;

fn main() {
    yew::Renderer::<tree_app::App>::new().render();
}
